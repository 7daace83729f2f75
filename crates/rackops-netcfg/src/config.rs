//! netcfg configuration

use anyhow::Result;
use rackops_core::config::{self, EnvVar};

pub const APP: &str = "rackops-netcfg";
pub const ABOUT: &str = "generates fabric network configuration from the controller topology";

pub const VARS: &[EnvVar] = &[
    EnvVar { name: "PORT", default: "1337", desc: "port on which to listen for requests" },
    EnvVar { name: "LISTEN", default: "0.0.0.0", desc: "IP address on which to listen for requests" },
    EnvVar { name: "CONTROLLER", default: "http://127.0.0.1:8181", desc: "connection string with which to reach the controller" },
    EnvVar { name: "USERNAME", default: "karaf", desc: "username with which to connect to the controller" },
    EnvVar { name: "PASSWORD", default: "karaf", desc: "password with which to connect to the controller" },
    EnvVar { name: "LOG_LEVEL", default: "warn", desc: "detail level for logging" },
    EnvVar { name: "LOG_FORMAT", default: "text", desc: "log output format, text or json" },
];

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub listen: String,
    pub controller: String,
    pub username: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: config::var_parse("PORT", "1337")?,
            listen: config::var("LISTEN", "0.0.0.0"),
            controller: config::var("CONTROLLER", "http://127.0.0.1:8181"),
            username: config::var("USERNAME", "karaf"),
            password: config::var("PASSWORD", "karaf"),
        })
    }
}
