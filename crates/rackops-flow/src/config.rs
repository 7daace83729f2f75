//! flow configuration

use crate::filter::HostFilter;
use anyhow::{Context, Result};
use rackops_core::config::{self, EnvVar};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const APP: &str = "rackops-flow";
pub const ABOUT: &str = "polls MAAS and drives each node toward the Deployed status";

pub const VARS: &[EnvVar] = &[
    EnvVar { name: "MAAS_URL", default: "http://localhost/MAAS", desc: "URL to access MAAS server" },
    EnvVar { name: "MAAS_API_KEY", default: "", desc: "API key to access MAAS server" },
    EnvVar { name: "MAAS_API_KEY_FILE", default: "/secrets/maas_api_key", desc: "file from which to read the API key when not set via environment" },
    EnvVar { name: "MAAS_SHOW_API_KEY", default: "false", desc: "show API key in clear text in logs" },
    EnvVar { name: "MAAS_API_VERSION", default: "1.0", desc: "API version to use with MAAS server" },
    EnvVar { name: "MAAS_QUERY_INTERVAL", default: "15s", desc: "frequency to query MAAS for nodes" },
    EnvVar { name: "PROVISION_URL", default: "", desc: "connection string for the provisioner service" },
    EnvVar { name: "PROVISION_TTL", default: "1h", desc: "duration to wait for a provisioning request to complete before considering it failed" },
    EnvVar { name: "PREVIEW_ONLY", default: "false", desc: "display actions that would be taken, but don't execute them" },
    EnvVar { name: "ALWAYS_RENAME", default: "true", desc: "attempt to rename hosts at every stage of the workflow" },
    EnvVar { name: "MAC_TO_NAME_MAPPINGS", default: "{}", desc: "custom MAC address to host name mappings (JSON or @file)" },
    EnvVar { name: "HOST_FILTER_SPEC", default: r#"{"hosts":{"include":[".*"]},"zones":{"include":["default"]}}"#, desc: "constrain hosts that are automated (JSON or @file)" },
    EnvVar { name: "POWER_HELPER_SCRIPT", default: "", desc: "script for power management support of nodes MAAS cannot reach" },
    EnvVar { name: "POWER_HELPER_USER", default: "cord", desc: "user passed to the power helper script" },
    EnvVar { name: "POWER_HELPER_HOST", default: "127.0.0.1", desc: "host passed to the power helper script" },
    EnvVar { name: "DISTRO_SERIES", default: "trusty", desc: "distro series used when deploying a node" },
    EnvVar { name: "LOG_LEVEL", default: "warn", desc: "detail level for logging" },
    EnvVar { name: "LOG_FORMAT", default: "text", desc: "log output format, text or json" },
];

/// Include-only filter specification, before regex compilation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub hosts: IncludeSpec,
    #[serde(default)]
    pub zones: IncludeSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncludeSpec {
    #[serde(default)]
    pub include: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub maas_url: String,
    pub maas_api_key: String,
    pub show_api_key: bool,
    pub maas_api_version: String,
    pub query_interval: Duration,
    pub provision_url: String,
    pub provision_ttl: Duration,
    pub preview_only: bool,
    pub always_rename: bool,
    pub mappings: HashMap<String, String>,
    pub filter: HostFilter,
    pub power_helper_script: String,
    pub power_helper_user: String,
    pub power_helper_host: String,
    pub distro_series: String,
}

impl Config {
    pub async fn from_env() -> Result<Self> {
        let mappings_spec = config::value_or_file(&config::var("MAC_TO_NAME_MAPPINGS", "{}"))
            .await
            .context("unable to load MAC to hostname mappings")?;
        let mappings: HashMap<String, String> = serde_json::from_str(&mappings_spec)
            .context("unable to parse MAC to hostname mappings")?;

        let filter_default = r#"{"hosts":{"include":[".*"]},"zones":{"include":["default"]}}"#;
        let filter_raw =
            config::value_or_file(&config::var("HOST_FILTER_SPEC", filter_default))
                .await
                .context("unable to load host filter specification")?;
        let filter_spec: FilterSpec = serde_json::from_str(&filter_raw)
            .context("unable to parse host filter specification")?;
        let filter =
            HostFilter::compile(&filter_spec).context("invalid host filter regular expression")?;

        let mut maas_api_key = config::var("MAAS_API_KEY", "");
        let api_key_file = config::var("MAAS_API_KEY_FILE", "/secrets/maas_api_key");
        if maas_api_key.is_empty() {
            debug!(file = %api_key_file, "MAAS API key not set, attempting to read from file");
            match tokio::fs::read_to_string(&api_key_file).await {
                Ok(key) => maas_api_key = key.trim().to_string(),
                Err(e) => {
                    warn!(file = %api_key_file, error = %e,
                        "failed to read MAAS API key file, was it mounted as a volume?");
                }
            }
        }

        Ok(Self {
            maas_url: config::var("MAAS_URL", "http://localhost/MAAS"),
            maas_api_key,
            show_api_key: config::var_bool("MAAS_SHOW_API_KEY", false)?,
            maas_api_version: config::var("MAAS_API_VERSION", "1.0"),
            query_interval: config::var_duration("MAAS_QUERY_INTERVAL", "15s")?,
            provision_url: config::var("PROVISION_URL", ""),
            provision_ttl: config::var_duration("PROVISION_TTL", "1h")?,
            preview_only: config::var_bool("PREVIEW_ONLY", false)?,
            always_rename: config::var_bool("ALWAYS_RENAME", true)?,
            mappings,
            filter,
            power_helper_script: config::var("POWER_HELPER_SCRIPT", ""),
            power_helper_user: config::var("POWER_HELPER_USER", "cord"),
            power_helper_host: config::var("POWER_HELPER_HOST", "127.0.0.1"),
            distro_series: config::var("DISTRO_SERIES", "trusty"),
        })
    }

    /// API key suitable for log output.
    pub fn displayed_api_key(&self) -> String {
        if self.show_api_key {
            self.maas_api_key.clone()
        } else {
            config::mask_secret(&self.maas_api_key)
        }
    }
}
