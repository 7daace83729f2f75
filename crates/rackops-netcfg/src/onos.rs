//! SDN controller topology types and client
//!
//! Typed views over the ONOS REST API (`/onos/v1/devices`, `/hosts`,
//! `/links`) and the derivations the fabric configuration needs: a MAC for
//! each switch from its chassis id, edge-router marking, and per-host
//! gateway and VLAN from the host's first IPv4 address.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("controller returned {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnosHost {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default, rename = "ipAddresses")]
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub location: HostLocation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostLocation {
    #[serde(default, rename = "elementId")]
    pub element_id: String,
    #[serde(default)]
    pub port: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnosHosts {
    #[serde(default)]
    pub hosts: Vec<OnosHost>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnosDevice {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "chassisId")]
    pub chassis_id: String,
    #[serde(default)]
    pub annotations: DeviceAnnotations,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceAnnotations {
    #[serde(default, rename = "managementAddress")]
    pub management_address: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnosDevices {
    #[serde(default)]
    pub devices: Vec<OnosDevice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnosLink {
    #[serde(default)]
    pub src: LinkEnd,
    #[serde(default)]
    pub dst: LinkEnd,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkEnd {
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub device: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnosLinks {
    #[serde(default)]
    pub links: Vec<OnosLink>,
}

/// Client for the controller's REST API.
#[derive(Debug, Clone)]
pub struct ControllerClient {
    base: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl ControllerClient {
    pub fn new(base: &str, username: &str, password: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, ControllerError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base, path))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ControllerError::Status(resp.status()));
        }
        Ok(resp.json().await?)
    }

    pub async fn devices(&self) -> Result<OnosDevices, ControllerError> {
        self.fetch("/onos/v1/devices").await
    }

    pub async fn hosts(&self) -> Result<OnosHosts, ControllerError> {
        self.fetch("/onos/v1/hosts").await
    }

    pub async fn links(&self) -> Result<OnosLinks, ControllerError> {
        self.fetch("/onos/v1/links").await
    }
}

/// Convert a chassis id into a MAC-shaped string by grouping every two
/// characters with a colon.
pub fn chassis_mac(chassis_id: &str) -> String {
    let mut out = String::with_capacity(chassis_id.len() + chassis_id.len() / 2);
    for (i, c) in chassis_id.chars().enumerate() {
        if i > 0 && i % 2 == 0 {
            out.push(':');
        }
        out.push(c);
    }
    out
}

/// A switch hosting a compute node acts as an edge router.
pub fn edge_routers(hosts: &[OnosHost]) -> HashMap<String, bool> {
    let mut edges = HashMap::new();
    for host in hosts {
        edges.insert(host.location.element_id.clone(), true);
    }
    edges
}

/// Gateway for a host: the `.254/24` of its first IPv4 address.
pub fn gateway(ips: &[String]) -> String {
    for ip in ips {
        if !ip.contains(':') {
            let parts: Vec<&str> = ip.split('.').collect();
            if parts.len() == 4 {
                return format!("{}.{}.{}.254/24", parts[0], parts[1], parts[2]);
            }
        }
    }
    "0.0.0.254/24".to_string()
}

/// VLAN for a host: the third octet of its first IPv4 address.
pub fn vlan(ips: &[String]) -> String {
    for ip in ips {
        if !ip.contains(':') {
            let parts: Vec<&str> = ip.split('.').collect();
            if parts.len() == 4 {
                return parts[2].to_string();
            }
        }
    }
    "0".to_string()
}
