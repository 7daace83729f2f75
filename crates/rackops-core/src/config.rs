//! Environment-driven configuration
//!
//! Every service is configured exclusively through environment variables.
//! Each service declares a table of [`EnvVar`] entries; `--help` prints the
//! table and defaults apply when a variable is unset. Invalid values are
//! surfaced as errors at startup and terminate the process.

use anyhow::{bail, Context, Result};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// One configurable environment variable: name, default, description.
#[derive(Debug, Clone, Copy)]
pub struct EnvVar {
    pub name: &'static str,
    pub default: &'static str,
    pub desc: &'static str,
}

/// Parse the command line. The only surface is `--help`/`-h`, which prints
/// the environment variable table and exits.
pub fn parse_cli(app: &'static str, about: &'static str, vars: &[EnvVar]) {
    let mut usage = String::from("Configuration (environment variables):\n");
    let width = vars.iter().map(|v| v.name.len()).max().unwrap_or(0);
    for v in vars {
        usage.push_str(&format!(
            "  {:width$}  {} (default: {:?})\n",
            v.name,
            v.desc,
            v.default,
            width = width
        ));
    }
    clap::Command::new(app)
        .about(about)
        .after_help(usage)
        .get_matches();
}

/// Read a string variable, falling back to the default when unset.
pub fn var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Read and parse a variable, falling back to the default when unset.
pub fn var_parse<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = var(name, default);
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid value '{raw}' for {name}: {e}"))
}

/// Read a duration variable in human form ("15s", "1h").
pub fn var_duration(name: &str, default: &str) -> Result<Duration> {
    let raw = var(name, default);
    humantime::parse_duration(&raw)
        .with_context(|| format!("invalid duration '{raw}' for {name}"))
}

/// Read a boolean variable ("true"/"false").
pub fn var_bool(name: &str, default: bool) -> Result<bool> {
    let raw = var(name, if default { "true" } else { "false" });
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => bail!("invalid boolean '{other}' for {name}"),
    }
}

/// Resolve a specification that is either an inline value or, when prefixed
/// with `@`, the path of a file holding the value.
pub async fn value_or_file(spec: &str) -> Result<String> {
    match spec.strip_prefix('@') {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("unable to read specification file '{path}'")),
        None => Ok(spec.to_string()),
    }
}

/// Mask all but the separators of a secret for log output.
pub fn mask_secret(secret: &str) -> String {
    secret
        .chars()
        .map(|c| if c == ':' { c } else { 'X' })
        .collect()
}
