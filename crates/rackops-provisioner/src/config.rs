//! provisioner configuration

use anyhow::Result;
use rackops_core::config::{self, EnvVar};

pub const APP: &str = "rackops-provisioner";
pub const ABOUT: &str = "accepts provisioning requests and executes them via a bounded worker pool";

pub const VARS: &[EnvVar] = &[
    EnvVar { name: "PORT", default: "4243", desc: "port on which to listen for requests" },
    EnvVar { name: "LISTEN", default: "0.0.0.0", desc: "IP on which to listen for requests" },
    EnvVar { name: "ROLE_SELECTOR_URL", default: "", desc: "connection string to query role for a device" },
    EnvVar { name: "DEFAULT_ROLE", default: "compute-node", desc: "default role for a device" },
    EnvVar { name: "SCRIPT", default: "do-ansible", desc: "default script to execute to provision a device" },
    EnvVar { name: "STORAGE_URL", default: "memory:", desc: "connection string to the persistence implementation" },
    EnvVar { name: "NUMBER_OF_WORKERS", default: "5", desc: "number of concurrent provisioning workers" },
    EnvVar { name: "LOG_LEVEL", default: "warn", desc: "detail level for logging" },
    EnvVar { name: "LOG_FORMAT", default: "text", desc: "log output format, text or json" },
];

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub listen: String,
    pub role_selector_url: String,
    pub default_role: String,
    pub script: String,
    pub storage_url: String,
    pub number_of_workers: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: config::var_parse("PORT", "4243")?,
            listen: config::var("LISTEN", "0.0.0.0"),
            role_selector_url: config::var("ROLE_SELECTOR_URL", ""),
            default_role: config::var("DEFAULT_ROLE", "compute-node"),
            script: config::var("SCRIPT", "do-ansible"),
            storage_url: config::var("STORAGE_URL", "memory:"),
            number_of_workers: config::var_parse("NUMBER_OF_WORKERS", "5")?,
        })
    }
}
