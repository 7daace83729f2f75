//! Switch discovery poll loop
//!
//! Each cycle reads the harvested address list, keeps the records whose MAC
//! identifies a managed switch, reconciles each one's provisioning state
//! against the provisioner, then atomically swaps the new list into the
//! published set and hands it to the MAAS synchronizer.

use rackops_core::address::{AddressRec, AddressSource};
use rackops_core::observability::metrics;
use rackops_core::provision::{ProvisionerClient, RequestInfo, TaskStatus};
use rackops_core::vendors::Vendors;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};

/// Published switch list, read by the REST surface.
#[derive(Default)]
pub struct PublishList {
    pub records: RwLock<Vec<AddressRec>>,
}

pub struct Poller {
    pub vendors: Vendors,
    pub source: Box<dyn AddressSource>,
    pub provisioner: ProvisionerClient,
    pub provision_ttl: Duration,
    pub role_selector_url: String,
    pub default_role: String,
    pub script: String,
    pub publish: Arc<PublishList>,
    pub push: mpsc::Sender<Vec<AddressRec>>,
}

impl Poller {
    /// Run poll cycles forever at the given interval.
    pub async fn run(self, interval: Duration) {
        loop {
            info!("checking for switches");
            self.cycle().await;
            tokio::time::sleep(interval).await;
        }
    }

    /// One poll cycle.
    pub async fn cycle(&self) {
        metrics::record_poll_cycle("switchq");
        let addresses = match self.source.addresses().await {
            Ok(addresses) => addresses,
            Err(e) => {
                error!(error = %e, "unable to read addresses from address source");
                metrics::record_upstream_error("switchq", "address-source");
                return;
            }
        };
        info!(count = addresses.len(), "queried addresses from address source");

        let mut next = Vec::with_capacity(addresses.len());
        for rec in addresses {
            debug!(name = %rec.name, ip = %rec.ip, mac = %rec.mac, "processing record");
            if !self.vendors.is_switch(&rec.mac) {
                debug!(name = %rec.name, ip = %rec.ip, mac = %rec.mac,
                    "host is not a known switch type");
                continue;
            }
            if let Err(e) = self.reconcile(&rec).await {
                error!(ip = %rec.ip, error = %e, "error when processing address record");
            }
            next.push(rec);
        }

        {
            let mut publish = self.publish.records.write().await;
            *publish = next.clone();
        }
        if self.push.send(next).await.is_err() {
            error!("MAAS synchronizer is gone, unable to push switch list");
        }
    }

    /// Ensure provisioning for a discovered switch.
    ///
    /// Pending or Running records are left alone. A Complete record within
    /// the TTL is done; with a TTL of zero a switch is provisioned exactly
    /// once. Failed, stale, or absent records trigger a fresh request.
    async fn reconcile(&self, rec: &AddressRec) -> Result<(), anyhow::Error> {
        let state = match self.provisioner.get(&rec.mac).await {
            Ok(state) => state,
            Err(e) => {
                error!(name = %rec.name, ip = %rec.ip, mac = %rec.mac, error = %e,
                    "error while retrieving provisioning state for device");
                return Err(e.into());
            }
        };

        let state = match state {
            Some(state) => match state.status {
                TaskStatus::Pending | TaskStatus::Running => {
                    debug!(name = %rec.name, mac = %rec.mac, "device is being provisioned");
                    return Ok(());
                }
                TaskStatus::Complete => {
                    debug!(name = %rec.name, mac = %rec.mac,
                        "device has completed provisioning");
                    Some(state)
                }
                TaskStatus::Failed => {
                    debug!(name = %rec.name, mac = %rec.mac, message = %state.message,
                        "device failed last provisioning, reattempting");
                    None
                }
            },
            None => {
                debug!(name = %rec.name, mac = %rec.mac, "device has no provisioning record");
                None
            }
        };

        let stale = match &state {
            Some(state) => {
                !self.provision_ttl.is_zero() && age(state.timestamp) > self.provision_ttl
            }
            None => false,
        };

        if state.is_none() || stale {
            if stale {
                debug!(name = %rec.name, mac = %rec.mac, "provisioning TTL expired, reprovisioning");
            }
            self.provision(rec).await?;
        } else if self.provision_ttl.is_zero() {
            debug!(name = %rec.name, mac = %rec.mac,
                "device has completed its one time provisioning");
        } else {
            debug!(name = %rec.name, mac = %rec.mac,
                "device has completed provisioning within the TTL");
        }
        Ok(())
    }

    async fn provision(&self, rec: &AddressRec) -> Result<(), anyhow::Error> {
        info!(name = %rec.name, mac = %rec.mac, "requesting provisioning of switch");
        let request = RequestInfo {
            id: rec.mac.clone(),
            name: rec.name.clone(),
            ip: rec.ip.clone(),
            mac: rec.mac.clone(),
            role_selector: self.role_selector_url.clone(),
            role: self.default_role.clone(),
            script: self.script.clone(),
        };
        self.provisioner.provision(&request).await?;
        Ok(())
    }
}

fn age(timestamp: i64) -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Duration::from_secs(now.saturating_sub(timestamp).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::Router;
    use rackops_core::address::new_address_source;
    use std::io::Write;
    use tokio::sync::Mutex;

    type Posted = Arc<Mutex<Vec<String>>>;

    /// Provisioner stub: records POST bodies, has no records.
    async fn spawn_stub_provisioner() -> (String, Posted) {
        let posted: Posted = Arc::new(Mutex::new(Vec::new()));

        async fn submit(State(posted): State<Posted>, body: String) -> StatusCode {
            posted.lock().await.push(body);
            StatusCode::ACCEPTED
        }

        let app = Router::new()
            .route("/provision/", post(submit))
            .route("/provision/{id}", get(|| async { StatusCode::NOT_FOUND }))
            .with_state(posted.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/provision/"), posted)
    }

    #[tokio::test]
    async fn test_only_known_switch_ouis_are_provisioned_and_published() {
        let vendors = Vendors::from_json(
            r#"[{"prefix": "AA:BB:CC", "vendor": "Accton", "provision": true}]"#,
        )
        .unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "leaf-1 IN A 10.6.0.2 ; AA:BB:CC:DD:EE:01").unwrap();
        writeln!(file, "host-1 IN A 10.6.0.3 ; 11:22:33:44:55:66").unwrap();
        let source =
            new_address_source(&format!("file://{}", file.path().display())).unwrap();

        let (provision_url, posted) = spawn_stub_provisioner().await;
        let publish = Arc::new(PublishList::default());
        let (push, mut push_rx) = mpsc::channel(1);

        let poller = Poller {
            vendors,
            source,
            provisioner: ProvisionerClient::new(&provision_url),
            provision_ttl: Duration::from_secs(3600),
            role_selector_url: String::new(),
            default_role: "fabric-switch".into(),
            script: "do-ansible".into(),
            publish: publish.clone(),
            push,
        };

        poller.cycle().await;

        // Exactly one provisioning request, for the switch MAC.
        let posted = posted.lock().await;
        assert_eq!(posted.len(), 1);
        assert!(posted[0].contains("AA:BB:CC:DD:EE:01"));
        assert!(posted[0].contains("fabric-switch"));

        // Exactly one published record, pushed to the synchronizer too.
        let records = publish.records.read().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mac, "AA:BB:CC:DD:EE:01");
        let pushed = push_rx.recv().await.unwrap();
        assert_eq!(pushed.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_record_is_left_alone() {
        use rackops_core::provision::{StatusMsg, WorkRequest};

        async fn pending_record() -> (StatusCode, axum::Json<StatusMsg>) {
            let msg = StatusMsg {
                request: WorkRequest {
                    info: RequestInfo::default(),
                    script: String::new(),
                    role: String::new(),
                },
                worker: -1,
                status: TaskStatus::Pending,
                message: String::new(),
                timestamp: 0,
            };
            (StatusCode::ACCEPTED, axum::Json(msg))
        }

        let posted: Posted = Arc::new(Mutex::new(Vec::new()));
        async fn submit(State(posted): State<Posted>, body: String) -> StatusCode {
            posted.lock().await.push(body);
            StatusCode::ACCEPTED
        }

        let app = Router::new()
            .route("/provision/", post(submit))
            .route("/provision/{id}", get(pending_record))
            .with_state(posted.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let vendors = Vendors::from_json(
            r#"[{"prefix": "AA:BB:CC", "vendor": "Accton", "provision": true}]"#,
        )
        .unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "leaf-1 IN A 10.6.0.2 ; AA:BB:CC:DD:EE:01").unwrap();
        let source =
            new_address_source(&format!("file://{}", file.path().display())).unwrap();
        let (push, _push_rx) = mpsc::channel(1);

        let poller = Poller {
            vendors,
            source,
            provisioner: ProvisionerClient::new(&format!("http://{addr}/provision/")),
            provision_ttl: Duration::from_secs(3600),
            role_selector_url: String::new(),
            default_role: "fabric-switch".into(),
            script: "do-ansible".into(),
            publish: Arc::new(PublishList::default()),
            push,
        };
        poller.cycle().await;

        // In-flight provisioning is not resubmitted, but the switch is
        // still published.
        assert!(posted.lock().await.is_empty());
        assert_eq!(poller.publish.records.read().await.len(), 1);
    }
}
