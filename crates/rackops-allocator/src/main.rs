//! rackops-allocator - MAC-sticky address allocation
//!
//! Maintains a circular queue of free IPs over a configured CIDR range and
//! serves allocate/release over REST. A MAC that already holds an address
//! always gets the same one back until it is released.

mod api;
mod config;
mod pool;

use anyhow::Context;
use api::AppState;
use config::Config;
use pool::AddressPool;
use rackops_core::observability::{init_tracing, metrics, TracingConfig};
use std::sync::Arc;
use tokio::sync::Mutex;
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
        network = %config.network,
        range_low = %config.range_low,
        range_high = %config.range_high,
        "configuration"
    );

    let pool = AddressPool::new(&config.network, config.range_low, config.range_high)
        .context("unable to initialize the address pool")?;

    let state = AppState {
        pool: Arc::new(Mutex::new(pool)),
    };
    let app = api::create_router(state);

    let addr = format!("{}:{}", config.listen, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to listen on '{addr}'"))?;
    info!(addr = %addr, "listening for requests");
    axum::serve(listener, app).await?;

    Ok(())
}
