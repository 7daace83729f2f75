//! rackops-netcfg - fabric configuration generation
//!
//! Serves a single endpoint that pulls the current topology from the SDN
//! controller and renders the fabric network configuration document.

mod api;
mod config;
mod onos;

use anyhow::Context;
use api::AppState;
use config::Config;
use onos::ControllerClient;
use rackops_core::observability::{init_tracing, metrics, TracingConfig};
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
        controller = %config.controller,
        username = %config.username,
        "configuration"
    );

    let controller = ControllerClient::new(&config.controller, &config.username, &config.password);
    let app = api::create_router(AppState { controller });

    let addr = format!("{}:{}", config.listen, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to listen on '{addr}'"))?;
    info!(addr = %addr, "listening for requests");
    axum::serve(listener, app).await?;

    Ok(())
}
