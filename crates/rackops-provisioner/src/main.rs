//! rackops-provisioner - post-deployment provisioning service
//!
//! Accepts provisioning requests over REST, dispatches them through a
//! bounded worker pool that runs an external script per node, and persists
//! each request's lifecycle in the configured storage backend.

mod api;
mod config;
mod dispatcher;

use anyhow::Context;
use api::AppState;
use config::Config;
use dispatcher::Dispatcher;
use rackops_core::observability::{init_tracing, metrics, TracingConfig};
use std::sync::Arc;
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
        role_selector_url = %config.role_selector_url,
        default_role = %config.default_role,
        script = %config.script,
        storage_url = %config.storage_url,
        number_of_workers = config.number_of_workers,
        "configuration"
    );

    let storage = rackops_core::storage::new_storage(&config.storage_url)
        .await
        .with_context(|| format!("unable to connect to storage '{}'", config.storage_url))?;
    let storage: Arc<dyn rackops_core::storage::Storage> = Arc::from(storage);

    let dispatcher = Dispatcher::start(config.number_of_workers, storage.clone());

    let addr = format!("{}:{}", config.listen, config.port);
    let state = AppState {
        config: Arc::new(config),
        storage,
        dispatcher,
        http: reqwest::Client::new(),
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to listen on '{addr}'"))?;
    info!(addr = %addr, "listening for requests");
    axum::serve(listener, app).await?;

    Ok(())
}
