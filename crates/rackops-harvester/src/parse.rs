//! Lease and reservation file parsing
//!
//! The lease database is line oriented: a `lease <ip> { ... }` block opens a
//! lease, and within the block `client-hostname`, `hardware`, `binding`,
//! `starts`, and `ends` lines are recognized. Reservations use
//! `host <name> { hardware ...; fixed-address ...; }` blocks.

use crate::lease::{generate_client_hostname, parse_binding_state, Lease};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// Time stamps in the lease file: `YYYY/M/D HH:MM:SS`.
const DATE_TIME_LAYOUT: &str = "%Y/%m/%d %H:%M:%S";

fn parse_timestamp(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let raw = format!("{} {}", date, time.trim_end_matches(';'));
    NaiveDateTime::parse_from_str(&raw, DATE_TIME_LAYOUT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Synthesize a hostname when the lease carries none or a known-bad one.
fn fix_client_hostname(lease: &mut Lease, bad_names: &HashSet<String>, template: &str) {
    if lease.client_hostname.is_empty() || bad_names.contains(&lease.client_hostname) {
        lease.client_hostname = generate_client_hostname(template, lease);
        debug!(ip = %lease.ip_address, name = %lease.client_hostname,
            "generated client hostname for lease");
    }
}

/// Parse one `{ ... }` lease body from the line iterator.
fn parse_lease_body<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    lease: &mut Lease,
    bad_names: &HashSet<String>,
    template: &str,
) {
    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(&first) = fields.first() else { continue };
        match first {
            "}" => {
                fix_client_hostname(lease, bad_names, template);
                return;
            }
            "client-hostname" if fields.len() >= 2 => {
                lease.client_hostname =
                    fields[1].trim_matches(|c| c == '"' || c == ';').to_string();
                // A known-bad name is dropped here; the block close will
                // synthesize a replacement once the hardware address is known.
                if bad_names.contains(&lease.client_hostname) {
                    lease.client_hostname = String::new();
                }
            }
            "hardware" if fields.len() >= 3 => {
                match fields[2].trim_end_matches(';').parse() {
                    Ok(mac) => lease.hardware_address = Some(mac),
                    Err(e) => {
                        warn!(ip = %lease.ip_address, error = %e,
                            "invalid hardware address in lease");
                    }
                }
            }
            "binding" if fields.len() >= 3 => {
                lease.binding_state = parse_binding_state(fields[2].trim_end_matches(';'));
            }
            "starts" if fields.len() >= 4 => {
                lease.starts = parse_timestamp(fields[2], fields[3]);
            }
            "ends" if fields.len() >= 4 => {
                lease.ends = parse_timestamp(fields[2], fields[3]);
            }
            _ => {}
        }
    }
}

/// Parse the entire lease file, keeping leases accepted by `filter`.
pub fn parse_lease_file<F>(
    content: &str,
    bad_names: &HashSet<String>,
    template: &str,
    filter: F,
) -> std::collections::HashMap<Ipv4Addr, Lease>
where
    F: Fn(&Lease) -> bool,
{
    let mut leases = std::collections::HashMap::new();
    let mut lines = content.lines();
    while let Some(line) = lines.next() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields[0] == "lease" {
            let Ok(ip) = fields[1].parse::<Ipv4Addr>() else {
                warn!(address = %fields[1], "invalid IP address in lease file");
                continue;
            };
            let mut lease = Lease::new(ip);
            parse_lease_body(&mut lines, &mut lease, bad_names, template);
            if filter(&lease) {
                leases.insert(lease.ip_address, lease);
            }
        }
    }
    leases
}

/// Parse one `host <name> { ... }` reservation body. A reservation requires
/// both a hardware address and a fixed address.
fn parse_reservation_body<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    name: &str,
) -> Option<Lease> {
    let mut mac = None;
    let mut ip = None;
    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(&first) = fields.first() else { continue };
        match first {
            "}" => {
                let (Some(mac), Some(ip)) = (mac, ip) else {
                    warn!(host = %name, "reservation requires hardware and fixed-address");
                    return None;
                };
                let mut lease = Lease::new(ip);
                lease.client_hostname = name.to_string();
                lease.hardware_address = Some(mac);
                return Some(lease);
            }
            "hardware" if fields.len() >= 3 => {
                mac = fields[2].trim_end_matches(';').parse().ok();
            }
            "fixed-address" if fields.len() >= 2 => {
                ip = fields[1].trim_end_matches(';').parse().ok();
            }
            _ => {}
        }
    }
    None
}

/// Merge reservations into the lease map, keyed by IP.
pub fn parse_reservation_file(
    content: &str,
    leases: &mut std::collections::HashMap<Ipv4Addr, Lease>,
) {
    let mut lines = content.lines();
    while let Some(line) = lines.next() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields[0] == "host" {
            if let Some(lease) = parse_reservation_body(&mut lines, fields[1]) {
                leases.insert(lease.ip_address, lease);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::BindingState;
    use chrono::TimeZone;

    const LEASE_FILE: &str = r#"
lease 10.1.0.10 {
  starts 1 2016/8/1 00:00:00;
  ends 3 2036/8/1 00:00:00;
  binding state active;
  hardware ethernet aa:bb:cc:dd:ee:01;
  client-hostname "client-1";
}
lease 10.1.0.11 {
  starts 1 2016/8/1 00:00:00;
  ends 3 2036/8/1 00:00:00;
  binding state free;
  hardware ethernet aa:bb:cc:dd:ee:02;
}
lease 10.1.0.12 {
  starts 1 2016/8/1 00:00:00;
  ends 3 2016/8/2 00:00:00;
  binding state active;
  hardware ethernet aa:bb:cc:dd:ee:03;
  client-hostname "expired-1";
}
lease 10.1.0.13 {
  starts 1 2016/8/1 00:00:00;
  ends 3 2036/8/1 00:00:00;
  binding state active;
  hardware ethernet aa:bb:cc:dd:ee:04;
  client-hostname "localhost";
}
"#;

    fn bad_names() -> HashSet<String> {
        ["localhost".to_string()].into_iter().collect()
    }

    fn active_filter(lease: &Lease) -> bool {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        lease.is_active_at(now)
    }

    #[test]
    fn test_parse_keeps_only_filtered_leases() {
        let leases = parse_lease_file(LEASE_FILE, &bad_names(), "UKN-{mac}", active_filter);
        // free and expired leases are dropped
        assert_eq!(leases.len(), 2);
        assert!(leases.contains_key(&"10.1.0.10".parse().unwrap()));
        assert!(leases.contains_key(&"10.1.0.13".parse().unwrap()));
    }

    #[test]
    fn test_parsed_fields_are_canonical() {
        let leases = parse_lease_file(LEASE_FILE, &bad_names(), "UKN-{mac}", |_| true);
        let lease = &leases[&"10.1.0.10".parse().unwrap()];
        assert_eq!(lease.client_hostname, "client-1");
        assert_eq!(lease.binding_state, BindingState::Active);
        assert_eq!(lease.mac_string(), "aa:bb:cc:dd:ee:01");
        assert_eq!(
            lease.starts.unwrap(),
            Utc.with_ymd_and_hms(2016, 8, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_hostname_is_synthesized() {
        let leases = parse_lease_file(LEASE_FILE, &bad_names(), "UKN-{mac}", |_| true);
        let lease = &leases[&"10.1.0.11".parse().unwrap()];
        assert_eq!(lease.client_hostname, "UKN-AABBCCDDEE02");
    }

    #[test]
    fn test_bad_hostname_is_synthesized() {
        let leases = parse_lease_file(LEASE_FILE, &bad_names(), "UKN-{mac}", |_| true);
        let lease = &leases[&"10.1.0.13".parse().unwrap()];
        assert_eq!(lease.client_hostname, "UKN-AABBCCDDEE04");
    }

    #[test]
    fn test_single_digit_month_and_day_parse() {
        assert_eq!(
            parse_timestamp("2016/8/1", "09:05:00;").unwrap(),
            Utc.with_ymd_and_hms(2016, 8, 1, 9, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_reservations_merge_by_ip() {
        let mut leases = parse_lease_file(LEASE_FILE, &bad_names(), "UKN-{mac}", active_filter);
        let reservations = r#"
host switch-1 {
  hardware ethernet aa:bb:cc:dd:ee:10;
  fixed-address 10.1.0.50;
}
host broken {
  hardware ethernet aa:bb:cc:dd:ee:11;
}
"#;
        parse_reservation_file(reservations, &mut leases);
        assert_eq!(leases.len(), 3);
        let lease = &leases[&"10.1.0.50".parse().unwrap()];
        assert_eq!(lease.client_hostname, "switch-1");
        assert_eq!(lease.mac_string(), "aa:bb:cc:dd:ee:10");
    }
}
