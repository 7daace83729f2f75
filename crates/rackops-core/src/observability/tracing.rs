//! Tracing subscriber setup
//!
//! Sets up console logging with:
//! - text or JSON output (`LOG_FORMAT`)
//! - level filtering via `LOG_LEVEL`, overridable per-target with `RUST_LOG`

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configuration for tracing initialization.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default log level when `RUST_LOG` is unset ("trace".."error").
    pub log_level: String,
    /// Log format: "text" or "json".
    pub log_format: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl TracingConfig {
    /// Create config from the conventional environment variables.
    pub fn from_env() -> Self {
        Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()),
            log_format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        }
    }
}

/// Initialize the tracing subscriber.
///
/// An unrecognized level falls back to `warn` rather than failing startup.
pub fn init_tracing(config: &TracingConfig) {
    let level: LevelFilter = config
        .log_level
        .parse()
        .unwrap_or_else(|_| {
            eprintln!(
                "unrecognized log level '{}', falling back to 'warn'",
                config.log_level
            );
            LevelFilter::WARN
        });

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_format, "text");
    }
}
