//! harvester configuration

use anyhow::Result;
use rackops_core::config::{self, EnvVar};
use std::collections::HashSet;
use std::time::Duration;

pub const APP: &str = "rackops-harvester";
pub const ABOUT: &str = "parses the DHCP lease database and publishes discovered leases";

pub const VARS: &[EnvVar] = &[
    EnvVar { name: "PORT", default: "4246", desc: "port on which the service will listen for requests" },
    EnvVar { name: "LISTEN", default: "0.0.0.0", desc: "IP on which the service will listen for requests" },
    EnvVar { name: "DHCP_LEASE_FILE", default: "/harvester/dhcpd.leases", desc: "lease file to parse for lease information" },
    EnvVar { name: "DHCP_RESERVATION_FILE", default: "/reservations/dhcpd.reservations", desc: "lease reservation file for IP information" },
    EnvVar { name: "OUTPUT_FILE", default: "", desc: "name of file to output discovered leases in bind9 format" },
    EnvVar { name: "OUTPUT_FORMAT", default: "{hostname}\tIN A {ip}\t; {mac}", desc: "per-entry format when outputting to a file" },
    EnvVar { name: "VERIFY_LEASES", default: "true", desc: "verify leases with a ping" },
    EnvVar { name: "VERIFY_TIMEOUT", default: "1s", desc: "max RTT to wait for verification pings" },
    EnvVar { name: "VERIFY_WITH_UDP", default: "false", desc: "use UDP probes instead of ICMP for verification" },
    EnvVar { name: "QUERY_PERIOD", default: "30s", desc: "period at which the DHCP lease file is processed" },
    EnvVar { name: "QUIET_PERIOD", default: "2s", desc: "period to wait between accepting parse requests" },
    EnvVar { name: "REQUEST_TIMEOUT", default: "10s", desc: "period to wait for processing when requesting a parse" },
    EnvVar { name: "RNDC_UPDATE", default: "false", desc: "reload the DNS server after harvest" },
    EnvVar { name: "RNDC_ADDRESS", default: "127.0.0.1", desc: "IP address of the DNS server to contact via RNDC" },
    EnvVar { name: "RNDC_PORT", default: "954", desc: "port of the DNS server to contact via RNDC" },
    EnvVar { name: "RNDC_KEY_FILE", default: "/key/rndc.conf.maas", desc: "key file with which to contact the DNS server" },
    EnvVar { name: "RNDC_ZONE", default: "cord.lab", desc: "zone to reload" },
    EnvVar { name: "BAD_CLIENT_NAMES", default: "localhost", desc: "comma-separated list of invalid client hostnames" },
    EnvVar { name: "CLIENT_NAME_TEMPLATE", default: "UKN-{mac}", desc: "template for generated host names; {mac} is the colon-stripped hardware address" },
    EnvVar { name: "LOG_LEVEL", default: "warn", desc: "log output level" },
    EnvVar { name: "LOG_FORMAT", default: "text", desc: "format of log messages" },
];

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub listen: String,
    pub lease_file: String,
    pub reservation_file: String,
    pub output_file: String,
    pub output_format: String,
    pub verify_leases: bool,
    pub verify_timeout: Duration,
    pub verify_with_udp: bool,
    pub query_period: Duration,
    pub quiet_period: Duration,
    pub request_timeout: Duration,
    pub rndc_update: bool,
    pub rndc_address: String,
    pub rndc_port: u16,
    pub rndc_key_file: String,
    pub rndc_zone: String,
    pub bad_client_names: HashSet<String>,
    pub client_name_template: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bad_client_names = config::var("BAD_CLIENT_NAMES", "localhost")
            .split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        Ok(Self {
            port: config::var_parse("PORT", "4246")?,
            listen: config::var("LISTEN", "0.0.0.0"),
            lease_file: config::var("DHCP_LEASE_FILE", "/harvester/dhcpd.leases"),
            reservation_file: config::var(
                "DHCP_RESERVATION_FILE",
                "/reservations/dhcpd.reservations",
            ),
            output_file: config::var("OUTPUT_FILE", ""),
            output_format: config::var("OUTPUT_FORMAT", "{hostname}\tIN A {ip}\t; {mac}"),
            verify_leases: config::var_bool("VERIFY_LEASES", true)?,
            verify_timeout: config::var_duration("VERIFY_TIMEOUT", "1s")?,
            verify_with_udp: config::var_bool("VERIFY_WITH_UDP", false)?,
            query_period: config::var_duration("QUERY_PERIOD", "30s")?,
            quiet_period: config::var_duration("QUIET_PERIOD", "2s")?,
            request_timeout: config::var_duration("REQUEST_TIMEOUT", "10s")?,
            rndc_update: config::var_bool("RNDC_UPDATE", false)?,
            rndc_address: config::var("RNDC_ADDRESS", "127.0.0.1"),
            rndc_port: config::var_parse("RNDC_PORT", "954")?,
            rndc_key_file: config::var("RNDC_KEY_FILE", "/key/rndc.conf.maas"),
            rndc_zone: config::var("RNDC_ZONE", "cord.lab"),
            bad_client_names,
            client_name_template: config::var("CLIENT_NAME_TEMPLATE", "UKN-{mac}"),
        })
    }
}
