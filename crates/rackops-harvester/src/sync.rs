//! Parse ownership and the harvest cycle
//!
//! A single task owns parsing and publication. It reads requests from a
//! bounded channel; a request landing inside the quiet period of the last
//! parse is answered `Quiet` without touching the lease file. Outside the
//! quiet period the owner parses, overlays reservations, optionally
//! verifies, optionally writes the output file and reloads DNS, and then
//! swaps the new maps in under the write lock.

use crate::config::Config;
use crate::lease::Lease;
use crate::parse::{parse_lease_file, parse_reservation_file};
use crate::verify::verify_leases;
use chrono::Utc;
use rackops_core::observability::metrics;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Depth of the harvest request channel.
pub const REQUEST_QUEUE_DEPTH: usize = 100;

/// Outcome of one harvest request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestOutcome {
    Harvested,
    Quiet,
}

/// A request to parse the lease database, answered on the oneshot.
pub struct HarvestRequest {
    pub response: oneshot::Sender<HarvestOutcome>,
}

/// The published lease maps, swapped atomically after each harvest.
#[derive(Debug, Default)]
pub struct LeaseMaps {
    pub by_ip: HashMap<String, Lease>,
    pub by_mac: HashMap<String, Lease>,
    pub by_hostname: HashMap<String, Lease>,
}

/// Shared state between the parse owner and the REST handlers.
pub struct Harvester {
    pub config: Config,
    pub maps: RwLock<LeaseMaps>,
}

impl Harvester {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            maps: RwLock::new(LeaseMaps::default()),
        }
    }
}

/// Spawn the parse owner.
pub fn spawn_sync_handler(
    harvester: Arc<Harvester>,
    mut requests: mpsc::Receiver<HarvestRequest>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last: Option<Instant> = None;
        while let Some(request) = requests.recv().await {
            if let Some(prev) = last {
                if prev.elapsed() < harvester.config.quiet_period {
                    warn!("request received during quiet period, will not harvest");
                    let _ = request.response.send(HarvestOutcome::Quiet);
                    continue;
                }
            }

            harvest(&harvester).await;
            last = Some(Instant::now());
            let _ = request.response.send(HarvestOutcome::Harvested);
        }
    })
}

/// Spawn the ticker that periodically requests a harvest.
pub fn spawn_periodic_harvest(
    requests: mpsc::Sender<HarvestRequest>,
    config: &Config,
) -> JoinHandle<()> {
    let query_period = config.query_period;
    let request_timeout = config.request_timeout;
    tokio::spawn(async move {
        loop {
            let (tx, rx) = oneshot::channel();
            if requests.send(HarvestRequest { response: tx }).await.is_err() {
                return;
            }
            if tokio::time::timeout(request_timeout, rx).await.is_err() {
                error!("request to process DHCP lease file timed out");
            }
            tokio::time::sleep(query_period).await;
        }
    })
}

/// One full harvest cycle. Errors are logged; the previous maps stay
/// published until a parse succeeds.
async fn harvest(harvester: &Harvester) {
    let config = &harvester.config;

    info!("synchronizing DHCP lease database");
    let content = match tokio::fs::read_to_string(&config.lease_file).await {
        Ok(content) => content,
        Err(e) => {
            error!(file = %config.lease_file, error = %e,
                "unable to read DHCP lease file");
            return;
        }
    };

    let now = Utc::now();
    let mut leases = parse_lease_file(
        &content,
        &config.bad_client_names,
        &config.client_name_template,
        |lease| lease.is_active_at(now),
    );
    let lease_count = leases.len();
    info!(count = lease_count, "read leases from lease file");

    if !config.reservation_file.is_empty() {
        info!("synchronizing DHCP reservation file");
        match tokio::fs::read_to_string(&config.reservation_file).await {
            Ok(content) => {
                parse_reservation_file(&content, &mut leases);
                info!(count = leases.len() - lease_count,
                    "read reservations from reservation file");
            }
            Err(e) => {
                error!(file = %config.reservation_file, error = %e,
                    "unable to read reservation file");
            }
        }
    }

    if config.verify_leases {
        info!(count = leases.len(), "verifying discovered leases");
        verify_leases(&mut leases, config.verify_timeout, config.verify_with_udp).await;
        info!(count = leases.len(), "discovered active and verified DHCP leases");
    } else {
        info!(count = leases.len(), "discovered active, not verified, DHCP leases");
    }

    if !config.output_file.is_empty() {
        if let Err(e) = write_output_file(config, &leases).await {
            error!(file = %config.output_file, error = %e,
                "unable to write lease information to file");
        }
    }

    if config.rndc_update {
        reload_zone(config).await;
    }

    let mut maps = harvester.maps.write().await;
    maps.by_ip = leases
        .iter()
        .map(|(ip, lease)| (ip.to_string(), lease.clone()))
        .collect();
    maps.by_mac = leases
        .values()
        .map(|lease| (lease.mac_string(), lease.clone()))
        .collect();
    maps.by_hostname = leases
        .values()
        .map(|lease| (lease.client_hostname.clone(), lease.clone()))
        .collect();
    metrics::set_leases_published(maps.by_ip.len());
}

/// Render a lease through the configured per-entry output template.
pub fn render_lease(template: &str, lease: &Lease) -> String {
    template
        .replace("{hostname}", &lease.client_hostname)
        .replace("{ip}", &lease.ip_address.to_string())
        .replace("{mac}", &lease.mac_string())
}

async fn write_output_file(
    config: &Config,
    leases: &HashMap<Ipv4Addr, Lease>,
) -> std::io::Result<()> {
    info!(file = %config.output_file, "writing lease information to file");
    let mut out = String::new();
    for lease in leases.values() {
        out.push_str(&render_lease(&config.output_format, lease));
        out.push('\n');
    }
    tokio::fs::write(&config.output_file, out).await
}

async fn reload_zone(config: &Config) {
    let port = config.rndc_port.to_string();
    let result = tokio::process::Command::new("rndc")
        .args(["-s", &config.rndc_address])
        .args(["-p", &port])
        .args(["-c", &config.rndc_key_file])
        .args(["reload", &config.rndc_zone])
        .status()
        .await;
    match result {
        Ok(status) if status.success() => {
            info!(zone = %config.rndc_zone, server = %config.rndc_address,
                "reloaded DNS zone via RNDC");
        }
        Ok(status) => {
            error!(zone = %config.rndc_zone, status = %status,
                "unexpected error while attempting to reload zone");
        }
        Err(e) => {
            error!(zone = %config.rndc_zone, error = %e,
                "unexpected error while attempting to reload zone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const LEASE_FILE: &str = r#"
lease 10.1.0.10 {
  starts 1 2016/8/1 00:00:00;
  ends 3 2036/8/1 00:00:00;
  binding state active;
  hardware ethernet aa:bb:cc:dd:ee:01;
  client-hostname "client-1";
}
"#;

    fn test_config(lease_file: &str) -> Config {
        Config {
            port: 0,
            listen: "127.0.0.1".into(),
            lease_file: lease_file.to_string(),
            reservation_file: String::new(),
            output_file: String::new(),
            output_format: "{hostname}\tIN A {ip}\t; {mac}".into(),
            verify_leases: false,
            verify_timeout: Duration::from_secs(1),
            verify_with_udp: false,
            query_period: Duration::from_secs(3600),
            quiet_period: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            rndc_update: false,
            rndc_address: "127.0.0.1".into(),
            rndc_port: 954,
            rndc_key_file: String::new(),
            rndc_zone: "cord.lab".into(),
            bad_client_names: ["localhost".to_string()].into_iter().collect(),
            client_name_template: "UKN-{mac}".into(),
        }
    }

    async fn request_harvest(
        requests: &mpsc::Sender<HarvestRequest>,
    ) -> HarvestOutcome {
        let (tx, rx) = oneshot::channel();
        requests
            .send(HarvestRequest { response: tx })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_second_request_within_quiet_period_is_quiet() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{LEASE_FILE}").unwrap();
        let harvester = Arc::new(Harvester::new(test_config(
            file.path().to_str().unwrap(),
        )));

        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        spawn_sync_handler(harvester.clone(), rx);

        assert_eq!(request_harvest(&tx).await, HarvestOutcome::Harvested);
        assert_eq!(harvester.maps.read().await.by_ip.len(), 1);

        // Immediately again: quiet, and the maps are untouched.
        assert_eq!(request_harvest(&tx).await, HarvestOutcome::Quiet);
        assert_eq!(harvester.maps.read().await.by_ip.len(), 1);
    }

    #[tokio::test]
    async fn test_harvest_populates_all_three_maps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{LEASE_FILE}").unwrap();
        let harvester = Arc::new(Harvester::new(test_config(
            file.path().to_str().unwrap(),
        )));

        harvest(&harvester).await;

        let maps = harvester.maps.read().await;
        assert!(maps.by_ip.contains_key("10.1.0.10"));
        assert!(maps.by_mac.contains_key("aa:bb:cc:dd:ee:01"));
        assert!(maps.by_hostname.contains_key("client-1"));
    }

    #[tokio::test]
    async fn test_failed_parse_keeps_previous_maps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{LEASE_FILE}").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let harvester = Arc::new(Harvester::new(test_config(&path)));

        harvest(&harvester).await;
        assert_eq!(harvester.maps.read().await.by_ip.len(), 1);

        drop(file);
        harvest(&harvester).await;
        assert_eq!(harvester.maps.read().await.by_ip.len(), 1);
    }

    #[test]
    fn test_render_round_trips_canonical_forms() {
        let leases = crate::parse::parse_lease_file(
            LEASE_FILE,
            &Default::default(),
            "UKN-{mac}",
            |_| true,
        );
        let lease = &leases[&"10.1.0.10".parse().unwrap()];
        let line = render_lease("{hostname}\tIN A {ip}\t; {mac}", lease);
        assert_eq!(line, "client-1\tIN A 10.1.0.10\t; aa:bb:cc:dd:ee:01");
    }
}
