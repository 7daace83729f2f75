//! rackops-harvester - DHCP lease harvesting
//!
//! Periodically parses the DHCP lease database on a quiet-period-rate-limited
//! schedule, optionally verifies leases with a ping, and exposes the
//! discovered leases over REST.

mod api;
mod config;
mod lease;
mod parse;
mod sync;
mod verify;

use anyhow::Context;
use api::AppState;
use config::Config;
use rackops_core::observability::{init_tracing, metrics, TracingConfig};
use std::sync::Arc;
use sync::{Harvester, REQUEST_QUEUE_DEPTH};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rackops_core::config::parse_cli(config::APP, config::ABOUT, config::VARS);

    init_tracing(&TracingConfig::from_env());
    metrics::init_metrics().map_err(|e| anyhow::anyhow!(e))?;

    let config = Config::from_env()?;
    info!(
        listen = %config.listen,
        port = config.port,
        lease_file = %config.lease_file,
        reservation_file = %config.reservation_file,
        output_file = %config.output_file,
        verify_leases = config.verify_leases,
        verify_timeout = ?config.verify_timeout,
        verify_with_udp = config.verify_with_udp,
        query_period = ?config.query_period,
        quiet_period = ?config.quiet_period,
        request_timeout = ?config.request_timeout,
        rndc_update = config.rndc_update,
        rndc_zone = %config.rndc_zone,
        client_name_template = %config.client_name_template,
        "configuration"
    );

    let addr = format!("{}:{}", config.listen, config.port);
    let harvester = Arc::new(Harvester::new(config.clone()));

    let (requests, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    sync::spawn_sync_handler(harvester.clone(), request_rx);
    sync::spawn_periodic_harvest(requests.clone(), &config);

    let state = AppState {
        harvester,
        requests,
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to listen on '{addr}'"))?;
    info!(addr = %addr, "listening for requests");
    axum::serve(listener, app).await?;

    Ok(())
}
