//! Lease liveness verification
//!
//! One probe per lease IP with a shared round-trip deadline; leases that do
//! not answer are dropped. The ICMP probe shells out to the system `ping`;
//! the UDP variant sends a datagram to a high port and treats an ICMP
//! port-unreachable (surfaced as ECONNREFUSED) as proof of life.

use crate::lease::Lease;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info};

const UDP_PROBE_PORT: u16 = 33434;

/// Drop leases whose IP does not answer a probe within `timeout`.
pub async fn verify_leases(
    leases: &mut HashMap<Ipv4Addr, Lease>,
    timeout: Duration,
    with_udp: bool,
) {
    let probes = leases.keys().copied().map(|ip| async move {
        let alive = if with_udp {
            udp_probe(ip, timeout).await
        } else {
            icmp_probe(ip, timeout).await
        };
        (ip, alive)
    });

    let results = futures::future::join_all(probes).await;
    for (ip, alive) in results {
        if alive {
            debug!(ip = %ip, "verified lease");
        } else {
            info!(ip = %ip, "discarding lease, could not be verified");
            leases.remove(&ip);
        }
    }
}

async fn icmp_probe(ip: Ipv4Addr, timeout: Duration) -> bool {
    let wait_secs = timeout.as_secs().max(1).to_string();
    let status = tokio::process::Command::new("ping")
        .arg("-c")
        .arg("1")
        .arg("-W")
        .arg(&wait_secs)
        .arg(ip.to_string())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await;
    matches!(status, Ok(status) if status.success())
}

async fn udp_probe(ip: Ipv4Addr, timeout: Duration) -> bool {
    let probe = async {
        let socket = match UdpSocket::bind("0.0.0.0:0").await {
            Ok(socket) => socket,
            Err(_) => return false,
        };
        if socket.connect((ip, UDP_PROBE_PORT)).await.is_err() {
            return false;
        }
        if socket.send(&[]).await.is_err() {
            return false;
        }
        let mut buf = [0u8; 32];
        match socket.recv(&mut buf).await {
            Ok(_) => true,
            // Port unreachable means the host is up and answered.
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => true,
            Err(_) => false,
        }
    };
    tokio::time::timeout(timeout, probe).await.unwrap_or(false)
}
