//! rackops-flow - MAAS node lifecycle automation
//!
//! Polls the MAAS controller for nodes and drives each one toward the
//! Deployed status by applying the transition table on every cycle. Upon
//! deployment the provisioner is invoked for post-deployment configuration.

mod actions;
mod config;
mod engine;
mod filter;

use actions::ProcessingOptions;
use anyhow::Context;
use config::Config;
use rackops_core::maas::MaasClient;
use rackops_core::observability::{init_tracing, TracingConfig};
use rackops_core::provision::ProvisionerClient;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rackops_core::config::parse_cli(config::APP, config::ABOUT, config::VARS);

    init_tracing(&TracingConfig::from_env());

    let config = Config::from_env().await?;
    info!(
        maas_url = %config.maas_url,
        maas_api_key = %config.displayed_api_key(),
        maas_api_version = %config.maas_api_version,
        query_interval = ?config.query_interval,
        provision_url = %config.provision_url,
        provision_ttl = ?config.provision_ttl,
        preview_only = config.preview_only,
        always_rename = config.always_rename,
        power_helper_script = %config.power_helper_script,
        power_helper_user = %config.power_helper_user,
        power_helper_host = %config.power_helper_host,
        distro_series = %config.distro_series,
        "configuration"
    );

    let client = MaasClient::new(
        &config.maas_url,
        &config.maas_api_key,
        &config.maas_api_version,
    )
    .context("unable to use the specified key to authenticate to the MAAS server")?;

    let options = ProcessingOptions {
        filter: config.filter.clone(),
        mappings: config.mappings.clone(),
        preview: config.preview_only,
        always_rename: config.always_rename,
        provisioner: ProvisionerClient::new(&config.provision_url),
        provision_ttl: config.provision_ttl,
        power_helper: config.power_helper_script.clone(),
        power_helper_user: config.power_helper_user.clone(),
        power_helper_host: config.power_helper_host.clone(),
        distro_series: config.distro_series.clone(),
    };

    // The first cycle runs immediately; subsequent cycles follow after the
    // configured interval, not at interval plus processing time.
    run_cycle(&client, &options).await;

    if config.preview_only {
        return Ok(());
    }

    loop {
        tokio::time::sleep(config.query_interval).await;
        info!("querying MAAS for nodes");
        run_cycle(&client, &options).await;
    }
}

async fn run_cycle(client: &MaasClient, options: &ProcessingOptions) {
    match client.list_nodes().await {
        Ok(nodes) => {
            engine::process_all(client, nodes, options).await;
        }
        Err(e) => {
            error!(error = %e, "unable to get the list of all nodes");
        }
    }
}
