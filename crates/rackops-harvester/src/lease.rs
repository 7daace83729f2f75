//! DHCP lease model

use chrono::{DateTime, Utc};
use macaddr::MacAddr6;
use serde::{Serialize, Serializer};
use std::net::Ipv4Addr;
use strum::{Display, EnumString};

/// Lease binding state as recorded in the lease database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum BindingState {
    Unknown,
    Free,
    Active,
    Expired,
    Released,
    Abandoned,
    Reset,
    Backup,
    Reserved,
    Bootp,
}

/// Convert from the lease file's lowercase token; anything unrecognized is
/// treated as Unknown.
pub fn parse_binding_state(token: &str) -> BindingState {
    token.parse().unwrap_or(BindingState::Unknown)
}

/// One DHCP lease (or reservation) keyed by IP address.
///
/// The hardware address and binding state serialize as their canonical
/// string forms.
#[derive(Debug, Clone, Serialize)]
pub struct Lease {
    #[serde(rename = "binding-state", serialize_with = "display")]
    pub binding_state: BindingState,
    #[serde(rename = "ip-address")]
    pub ip_address: Ipv4Addr,
    #[serde(rename = "client-hostname")]
    pub client_hostname: String,
    #[serde(rename = "hardware-address", serialize_with = "mac_display")]
    pub hardware_address: Option<MacAddr6>,
    pub starts: Option<DateTime<Utc>>,
    pub ends: Option<DateTime<Utc>>,
}

fn display<S: Serializer>(state: &BindingState, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&state.to_string())
}

fn mac_display<S: Serializer>(
    mac: &Option<MacAddr6>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match mac {
        Some(mac) => serializer.serialize_str(&mac.to_string().to_lowercase()),
        None => serializer.serialize_str(""),
    }
}

impl Lease {
    pub fn new(ip_address: Ipv4Addr) -> Self {
        Self {
            binding_state: BindingState::Unknown,
            ip_address,
            client_hostname: String::new(),
            hardware_address: None,
            starts: None,
            ends: None,
        }
    }

    /// Canonical lowercase colon-separated hardware address, or empty.
    pub fn mac_string(&self) -> String {
        self.hardware_address
            .map(|mac| mac.to_string().to_lowercase())
            .unwrap_or_default()
    }

    /// Whether the lease window contains `now` and the address is bound.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.binding_state != BindingState::Free
            && matches!((self.starts, self.ends), (Some(s), Some(e)) if s <= now && now <= e)
    }
}

/// Synthesize a client hostname from the configured template, where `{mac}`
/// stands for the hardware address, upper-case with colons stripped.
pub fn generate_client_hostname(template: &str, lease: &Lease) -> String {
    let mac = lease
        .mac_string()
        .to_uppercase()
        .replace(':', "");
    template.replace("{mac}", &mac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lease() -> Lease {
        Lease {
            binding_state: BindingState::Active,
            ip_address: "10.1.0.10".parse().unwrap(),
            client_hostname: "client-1".into(),
            hardware_address: Some("aa:bb:cc:dd:ee:01".parse().unwrap()),
            starts: Some(Utc.with_ymd_and_hms(2016, 8, 1, 0, 0, 0).unwrap()),
            ends: Some(Utc.with_ymd_and_hms(2036, 8, 1, 0, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_binding_state_parse_is_case_insensitive() {
        assert_eq!(parse_binding_state("active"), BindingState::Active);
        assert_eq!(parse_binding_state("Free"), BindingState::Free);
        assert_eq!(parse_binding_state("bogus"), BindingState::Unknown);
    }

    #[test]
    fn test_lease_serializes_canonical_strings() {
        let json = serde_json::to_value(lease()).unwrap();
        assert_eq!(json["binding-state"], "Active");
        assert_eq!(json["hardware-address"], "aa:bb:cc:dd:ee:01");
        assert_eq!(json["ip-address"], "10.1.0.10");
    }

    #[test]
    fn test_window_check() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let mut l = lease();
        assert!(l.is_active_at(now));
        l.binding_state = BindingState::Free;
        assert!(!l.is_active_at(now));
        let mut l = lease();
        l.ends = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert!(!l.is_active_at(now));
    }

    #[test]
    fn test_generated_hostname_strips_colons() {
        let name = generate_client_hostname("UKN-{mac}", &lease());
        assert_eq!(name, "UKN-AABBCCDDEE01");
    }
}
