//! switchq configuration

use anyhow::Result;
use rackops_core::config::{self, EnvVar};
use std::time::Duration;
use tracing::{debug, warn};

pub const APP: &str = "rackops-switchq";
pub const ABOUT: &str = "discovers leased switches by OUI and keeps them provisioned and enrolled";

pub const VARS: &[EnvVar] = &[
    EnvVar { name: "VENDORS_URL", default: "file:///switchq/vendors.json", desc: "URL that specifies supported vendor OUI information" },
    EnvVar { name: "ADDRESS_URL", default: "file:///switchq/dhcp_harvest.inc", desc: "URL of service or file from which to query IP information" },
    EnvVar { name: "POLL_INTERVAL", default: "1m", desc: "how often IP information should be queried and processed" },
    EnvVar { name: "PROVISION_TTL", default: "1h", desc: "duration to wait for a provisioning request before considering it failed" },
    EnvVar { name: "PROVISION_URL", default: "", desc: "URL of the provisioning service" },
    EnvVar { name: "ROLE_SELECTOR_URL", default: "", desc: "URL of service to query for switch role" },
    EnvVar { name: "DEFAULT_ROLE", default: "fabric-switch", desc: "default switch role" },
    EnvVar { name: "SCRIPT", default: "do-ansible", desc: "script the provisioner should run" },
    EnvVar { name: "LISTEN", default: "0.0.0.0", desc: "IP on which to listen for requests" },
    EnvVar { name: "PORT", default: "4244", desc: "port on which to listen for requests" },
    EnvVar { name: "MAAS_URL", default: "http://localhost/MAAS", desc: "connection string for MAAS" },
    EnvVar { name: "MAAS_API_KEY", default: "", desc: "API key for MAAS" },
    EnvVar { name: "MAAS_API_KEY_FILE", default: "/secrets/maas_api_key", desc: "file from which to read the API key" },
    EnvVar { name: "MAAS_SHOW_API_KEY", default: "false", desc: "display API key in the log" },
    EnvVar { name: "LOG_LEVEL", default: "warn", desc: "detail level for logging" },
    EnvVar { name: "LOG_FORMAT", default: "text", desc: "output format for logging, text or json" },
];

#[derive(Debug, Clone)]
pub struct Config {
    pub vendors_url: String,
    pub address_url: String,
    pub poll_interval: Duration,
    pub provision_ttl: Duration,
    pub provision_url: String,
    pub role_selector_url: String,
    pub default_role: String,
    pub script: String,
    pub listen: String,
    pub port: u16,
    pub maas_url: String,
    pub maas_api_key: String,
    pub show_api_key: bool,
}

impl Config {
    pub async fn from_env() -> Result<Self> {
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
            vendors_url: config::var("VENDORS_URL", "file:///switchq/vendors.json"),
            address_url: config::var("ADDRESS_URL", "file:///switchq/dhcp_harvest.inc"),
            poll_interval: config::var_duration("POLL_INTERVAL", "1m")?,
            provision_ttl: config::var_duration("PROVISION_TTL", "1h")?,
            provision_url: config::var("PROVISION_URL", ""),
            role_selector_url: config::var("ROLE_SELECTOR_URL", ""),
            default_role: config::var("DEFAULT_ROLE", "fabric-switch"),
            script: config::var("SCRIPT", "do-ansible"),
            listen: config::var("LISTEN", "0.0.0.0"),
            port: config::var_parse("PORT", "4244")?,
            maas_url: config::var("MAAS_URL", "http://localhost/MAAS"),
            maas_api_key,
            show_api_key: config::var_bool("MAAS_SHOW_API_KEY", false)?,
        })
    }

    pub fn displayed_api_key(&self) -> String {
        if self.show_api_key {
            self.maas_api_key.clone()
        } else {
            config::mask_secret(&self.maas_api_key)
        }
    }
}
