//! MAAS node, device, and subnet types
//!
//! Deserialized views over the MAAS REST listings. MAAS is authoritative for
//! every field here; the services never write status directly, they trigger
//! operations that advance it.

use serde::Deserialize;
use strum::{Display, EnumString};
use thiserror::Error;

/// MAAS node lifecycle status, as reported by the `substatus` integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum NodeStatus {
    New,
    Commissioning,
    FailedCommissioning,
    Missing,
    Ready,
    Reserved,
    Deployed,
    Retired,
    Broken,
    Deploying,
    Allocated,
    FailedDeployment,
    Releasing,
    FailedReleasing,
    DiskErasing,
    FailedDiskErasing,
}

#[derive(Debug, Error)]
#[error("unknown MAAS node sub-status '{0}'")]
pub struct UnknownStatus(pub i64);

impl TryFrom<i64> for NodeStatus {
    type Error = UnknownStatus;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        use NodeStatus::*;
        Ok(match value {
            0 => New,
            1 => Commissioning,
            2 => FailedCommissioning,
            3 => Missing,
            4 => Ready,
            5 => Reserved,
            6 => Deployed,
            7 => Retired,
            8 => Broken,
            9 => Deploying,
            10 => Allocated,
            11 => FailedDeployment,
            12 => Releasing,
            13 => FailedReleasing,
            14 => DiskErasing,
            15 => FailedDiskErasing,
            other => return Err(UnknownStatus(other)),
        })
    }
}

/// A node as returned by the nodes listing.
#[derive(Debug, Clone, Deserialize)]
pub struct MaasNode {
    pub system_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub substatus: i64,
    #[serde(default)]
    pub power_state: String,
    #[serde(default)]
    pub power_type: String,
    #[serde(default)]
    pub zone: Zone,
    #[serde(default)]
    pub interface_set: Vec<Interface>,
    #[serde(default)]
    pub macaddress_set: Vec<MacEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Zone {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interface {
    pub id: i64,
    #[serde(default)]
    pub resource_uri: String,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub id: i64,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub subnet: Option<LinkSubnet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkSubnet {
    #[serde(default)]
    pub cidr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MacEntry {
    #[serde(default)]
    pub mac_address: String,
}

impl MaasNode {
    /// Lifecycle status from the sub-status integer.
    pub fn status(&self) -> Result<NodeStatus, UnknownStatus> {
        NodeStatus::try_from(self.substatus)
    }

    /// IP addresses in interface-link order.
    pub fn ips(&self) -> Vec<String> {
        self.interface_set
            .iter()
            .flat_map(|ifc| ifc.links.iter())
            .filter_map(|link| link.ip_address.clone())
            .filter(|ip| !ip.is_empty())
            .collect()
    }

    /// MAC addresses, primary first.
    pub fn macs(&self) -> Vec<String> {
        self.macaddress_set
            .iter()
            .map(|m| m.mac_address.clone())
            .collect()
    }

    /// Hostname with any domain suffix stripped.
    pub fn short_hostname(&self) -> &str {
        match self.hostname.find('.') {
            Some(idx) => &self.hostname[..idx],
            None => &self.hostname,
        }
    }

    pub fn zone_name(&self) -> &str {
        &self.zone.name
    }
}

/// A device as returned by the devices listing.
#[derive(Debug, Clone, Deserialize)]
pub struct MaasDevice {
    #[serde(default)]
    pub system_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub resource_uri: String,
    #[serde(default)]
    pub macaddress_set: Vec<MacEntry>,
    #[serde(default)]
    pub interface_set: Vec<Interface>,
}

impl MaasDevice {
    /// Hostname with any domain suffix stripped.
    pub fn short_hostname(&self) -> &str {
        match self.hostname.find('.') {
            Some(idx) => &self.hostname[..idx],
            None => &self.hostname,
        }
    }

    /// The device's single MAC address, uppercased.
    pub fn primary_mac(&self) -> Option<String> {
        self.macaddress_set
            .first()
            .map(|m| m.mac_address.to_uppercase())
    }
}

/// A subnet as returned by the subnets listing.
#[derive(Debug, Clone, Deserialize)]
pub struct MaasSubnet {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub vlan: SubnetVlan,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubnetVlan {
    #[serde(default)]
    pub id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_substatus() {
        assert_eq!(NodeStatus::try_from(0).unwrap(), NodeStatus::New);
        assert_eq!(NodeStatus::try_from(6).unwrap(), NodeStatus::Deployed);
        assert_eq!(
            NodeStatus::try_from(15).unwrap(),
            NodeStatus::FailedDiskErasing
        );
        assert!(NodeStatus::try_from(16).is_err());
        assert!(NodeStatus::try_from(-1).is_err());
    }

    #[test]
    fn test_status_name_round_trip() {
        assert_eq!(NodeStatus::Deployed.to_string(), "Deployed");
        assert_eq!(
            "FailedCommissioning".parse::<NodeStatus>().unwrap(),
            NodeStatus::FailedCommissioning
        );
    }

    #[test]
    fn test_node_accessors() {
        let node: MaasNode = serde_json::from_value(serde_json::json!({
            "system_id": "node-1",
            "hostname": "host-1.example.com",
            "substatus": 4,
            "power_state": "off",
            "zone": { "name": "default" },
            "interface_set": [
                {
                    "id": 10,
                    "resource_uri": "/MAAS/api/1.0/nodes/node-1/interfaces/10/",
                    "links": [
                        { "id": 20, "mode": "auto", "ip_address": "10.2.0.5",
                          "subnet": { "cidr": "10.2.0.0/24" } }
                    ]
                }
            ],
            "macaddress_set": [
                { "mac_address": "aa:bb:cc:dd:ee:01" },
                { "mac_address": "aa:bb:cc:dd:ee:02" }
            ]
        }))
        .unwrap();

        assert_eq!(node.status().unwrap(), NodeStatus::Ready);
        assert_eq!(node.short_hostname(), "host-1");
        assert_eq!(node.ips(), vec!["10.2.0.5".to_string()]);
        assert_eq!(node.macs()[0], "aa:bb:cc:dd:ee:01");
        assert_eq!(node.zone_name(), "default");
    }
}
