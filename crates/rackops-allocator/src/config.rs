//! allocator configuration

use anyhow::{Context, Result};
use rackops_core::config::{self, EnvVar};
use std::net::Ipv4Addr;

pub const APP: &str = "rackops-allocator";
pub const ABOUT: &str = "serves MAC-sticky IP allocation over a configured range";

pub const VARS: &[EnvVar] = &[
    EnvVar { name: "PORT", default: "4242", desc: "port on which to listen for requests" },
    EnvVar { name: "LISTEN", default: "0.0.0.0", desc: "IP on which to listen for requests" },
    EnvVar { name: "NETWORK", default: "10.0.0.0/24", desc: "subnet to allocate via requests" },
    EnvVar { name: "RANGE_LOW", default: "10.0.0.2", desc: "low value in range to allocate" },
    EnvVar { name: "RANGE_HIGH", default: "10.0.0.253", desc: "high value in range to allocate" },
    EnvVar { name: "LOG_LEVEL", default: "warn", desc: "detail level for logging" },
    EnvVar { name: "LOG_FORMAT", default: "text", desc: "log output format, text or json" },
];

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub listen: String,
    pub network: String,
    pub range_low: Ipv4Addr,
    pub range_high: Ipv4Addr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: config::var_parse("PORT", "4242")?,
            listen: config::var("LISTEN", "0.0.0.0"),
            network: config::var("NETWORK", "10.0.0.0/24"),
            range_low: config::var("RANGE_LOW", "10.0.0.2")
                .parse()
                .context("invalid RANGE_LOW address")?,
            range_high: config::var("RANGE_HIGH", "10.0.0.253")
                .parse()
                .context("invalid RANGE_HIGH address")?,
        })
    }
}
