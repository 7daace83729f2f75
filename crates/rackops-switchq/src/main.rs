//! rackops-switchq - switch discovery and enrollment
//!
//! Polls the harvested address list, filters it down to managed switches by
//! vendor OUI, keeps each switch provisioned through the provisioner, and
//! synchronizes the discovered set into MAAS as devices.

mod api;
mod config;
mod poller;
mod sync;

use anyhow::Context;
use api::AppState;
use config::Config;
use poller::{Poller, PublishList};
use rackops_core::address::new_address_source;
use rackops_core::maas::MaasClient;
use rackops_core::observability::{init_tracing, metrics, TracingConfig};
use rackops_core::provision::ProvisionerClient;
use rackops_core::vendors::Vendors;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rackops_core::config::parse_cli(config::APP, config::ABOUT, config::VARS);

    init_tracing(&TracingConfig::from_env());
    metrics::init_metrics().map_err(|e| anyhow::anyhow!(e))?;

    let config = Config::from_env().await?;
    info!(
        vendors_url = %config.vendors_url,
        address_url = %config.address_url,
        poll_interval = ?config.poll_interval,
        provision_ttl = ?config.provision_ttl,
        provision_url = %config.provision_url,
        role_selector_url = %config.role_selector_url,
        default_role = %config.default_role,
        script = %config.script,
        listen = %config.listen,
        port = config.port,
        maas_url = %config.maas_url,
        maas_api_key = %config.displayed_api_key(),
        "configuration"
    );

    let vendors = Vendors::load(&config.vendors_url)
        .await
        .with_context(|| {
            format!(
                "unable to create known vendors list from '{}'",
                config.vendors_url
            )
        })?;

    let source = new_address_source(&config.address_url).with_context(|| {
        format!("unable to create address source for '{}'", config.address_url)
    })?;

    let maas = MaasClient::new(&config.maas_url, &config.maas_api_key, "1.0")
        .with_context(|| format!("unable to connect to MAAS at '{}'", config.maas_url))?;

    let publish = Arc::new(PublishList::default());
    let (push, push_rx) = mpsc::channel(1);

    let poller = Poller {
        vendors,
        source,
        provisioner: ProvisionerClient::new(&config.provision_url),
        provision_ttl: config.provision_ttl,
        role_selector_url: config.role_selector_url.clone(),
        default_role: config.default_role.clone(),
        script: config.script.clone(),
        publish: publish.clone(),
        push,
    };
    tokio::spawn(poller.run(config.poll_interval));
    tokio::spawn(sync::sync_to_maas(maas, push_rx));

    let app = api::create_router(AppState { publish });
    let addr = format!("{}:{}", config.listen, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to listen on '{addr}'"))?;
    info!(addr = %addr, "listening for requests");
    axum::serve(listener, app).await?;

    Ok(())
}
