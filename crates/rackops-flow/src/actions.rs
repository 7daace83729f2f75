//! Node lifecycle actions
//!
//! Each action issues one MAAS operation or side-effect for a node and
//! returns success or a diagnostic error. Actions are selected by the
//! transition table and applied in order, stopping on the first error.
//! In preview mode every MAAS mutation is skipped while the sequence still
//! runs to produce the same log output.

use crate::filter::HostFilter;
use rackops_core::maas::{MaasClient, MaasError, MaasNode};
use rackops_core::provision::{ProvisionerClient, RequestInfo, TaskStatus};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use strum::Display;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Maas(#[from] MaasError),
    #[error("unable to determine IP address of host '{0}'")]
    NoAddress(String),
    #[error("power helper script failed: {0}")]
    PowerHelper(#[from] std::io::Error),
    #[error("unable to parse power helper output: {0}")]
    PowerHelperOutput(#[from] serde_json::Error),
}

/// Options shared by every action application.
#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    pub filter: HostFilter,
    pub mappings: HashMap<String, String>,
    pub preview: bool,
    pub always_rename: bool,
    pub provisioner: ProvisionerClient,
    pub provision_ttl: Duration,
    pub power_helper: String,
    pub power_helper_user: String,
    pub power_helper_host: String,
    pub distro_series: String,
}

/// Power settings discovered by the power helper script.
#[derive(Debug, Deserialize)]
struct PowerInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    mac_address: String,
    #[serde(default)]
    power_password: String,
    #[serde(default)]
    power_address: String,
}

/// One step toward the target status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Action {
    Reset,
    Commission,
    Acquire,
    Deploy,
    Provision,
    Done,
    Wait,
    Fail,
    AdminState,
}

impl Action {
    pub async fn apply(
        self,
        client: &MaasClient,
        node: &MaasNode,
        options: &ProcessingOptions,
    ) -> Result<(), ActionError> {
        match self {
            Action::Reset => reset(client, node, options).await,
            Action::Commission => commission(client, node, options).await,
            Action::Acquire => acquire(client, node, options).await,
            Action::Deploy => deploy(client, node, options).await,
            Action::Provision => provision(client, node, options).await,
            Action::Done => {
                debug!(node = %node.hostname, "COMPLETE");
                rename_if_configured(client, node, options).await;
                Ok(())
            }
            Action::Wait => {
                info!(node = %node.hostname, "WAIT");
                rename_if_configured(client, node, options).await;
                Ok(())
            }
            Action::Fail => {
                info!(node = %node.hostname, "FAIL");
                rename_if_configured(client, node, options).await;
                Ok(())
            }
            Action::AdminState => {
                info!(node = %node.hostname, "ADMIN");
                rename_if_configured(client, node, options).await;
                Ok(())
            }
        }
    }
}

/// Rename the node per the MAC-to-hostname mapping.
///
/// Strips any domain suffix from the current name first; never fatal.
async fn update_node_name(client: &MaasClient, node: &MaasNode, options: &ProcessingOptions) {
    let current = node.short_hostname();
    for mac in node.macs() {
        if let Some(name) = options.mappings.get(&mac) {
            if current != name {
                info!(node = %node.hostname, new_name = %name, "RENAME");
                if !options.preview {
                    if let Err(e) = client
                        .update_node(&node.system_id, &[("hostname", name)])
                        .await
                    {
                        error!(node = %node.hostname, error = %e, "unable to rename node");
                    }
                }
            }
        }
    }
}

async fn rename_if_configured(
    client: &MaasClient,
    node: &MaasNode,
    options: &ProcessingOptions,
) {
    if options.always_rename {
        update_node_name(client, node, options).await;
    }
}

/// Re-align bookkeeping for a node that is not yet at the target: apply the
/// rename rule and clear any stale provisioning record.
async fn reset(
    client: &MaasClient,
    node: &MaasNode,
    options: &ProcessingOptions,
) -> Result<(), ActionError> {
    debug!(node = %node.hostname, "RESET");
    rename_if_configured(client, node, options).await;

    if let Err(e) = options.provisioner.clear(&node.system_id).await {
        error!(node = %node.system_id, error = %e,
            "attempting to clear provisioning state of node");
    }
    Ok(())
}

/// Drive a node into commissioning, first forcing its power off.
async fn commission(
    client: &MaasClient,
    node: &MaasNode,
    options: &ProcessingOptions,
) -> Result<(), ActionError> {
    update_node_name(client, node, options).await;

    match node.power_state.as_str() {
        "on" => {
            info!(node = %node.hostname, "POWER DOWN");
            if !options.preview {
                if let Err(e) = client
                    .node_op(&node.system_id, "stop", &[("stop_mode", "soft")])
                    .await
                {
                    error!(node = %node.hostname, error = %e,
                        "commission: changing power state to off");
                    return Err(e.into());
                }
            }
            Ok(())
        }
        "off" => {
            info!(node = %node.hostname, "COMMISSION");
            if !options.preview {
                if let Err(e) = client.node_op(&node.system_id, "commission", &[]).await {
                    error!(node = %node.hostname, error = %e, "commission");
                    return Err(e.into());
                }
            }
            Ok(())
        }
        state => {
            warn!(node = %node.hostname, power_state = %state, "invalid power state");

            // With no usable power state and no power type, a configured
            // helper script can discover the power settings for us.
            if !options.power_helper.is_empty() && node.power_type.is_empty() {
                discover_power_settings(client, node, options).await?;
            }
            Ok(())
        }
    }
}

async fn discover_power_settings(
    client: &MaasClient,
    node: &MaasNode,
    options: &ProcessingOptions,
) -> Result<(), ActionError> {
    let output = tokio::process::Command::new(&options.power_helper)
        .arg(&options.power_helper_user)
        .arg(&options.power_helper_host)
        .args(node.macs())
        .output()
        .await
        .map_err(|e| {
            error!(script = %options.power_helper, error = %e,
                "failed while executing power helper script");
            e
        })?;

    let power: PowerInfo = serde_json::from_slice(&output.stdout).map_err(|e| {
        error!(script = %options.power_helper, error = %e,
            "failed to parse output of power helper script");
        e
    })?;

    match power.name.as_str() {
        "amt" => {
            let params = [
                ("power_type", power.name.as_str()),
                ("power_parameters_mac_address", power.mac_address.as_str()),
                ("power_parameters_power_pass", power.power_password.as_str()),
                ("power_parameters_power_address", power.power_address.as_str()),
            ];
            if let Err(e) = client.update_node(&node.system_id, &params).await {
                error!(node = %node.hostname, error = %e, "error updating power settings");
            }
        }
        other => {
            warn!(power_type = %other, "unsupported power type discovered");
        }
    }
    Ok(())
}

/// Acquire the node, first relinking auto-mode interfaces in DHCP mode.
///
/// Newer MAAS requires the DHCP-mode subnet linkage before acquisition.
async fn acquire(
    client: &MaasClient,
    node: &MaasNode,
    options: &ProcessingOptions,
) -> Result<(), ActionError> {
    info!(node = %node.hostname, "ACQUIRE");
    rename_if_configured(client, node, options).await;

    if options.preview {
        return Ok(());
    }

    let interfaces = client.list_interfaces(&node.system_id).await?;
    for ifc in &interfaces {
        for link in &ifc.links {
            let Some(subnet) = &link.subnet else { continue };
            if link.mode != "auto" {
                continue;
            }
            let link_id = link.id.to_string();
            client
                .interface_op(&node.system_id, ifc.id, "unlink_subnet", &[("id", &link_id)])
                .await?;
            client
                .interface_op(
                    &node.system_id,
                    ifc.id,
                    "link_subnet",
                    &[("mode", "DHCP"), ("subnet", &subnet.cidr)],
                )
                .await?;
        }
    }

    if let Err(e) = client
        .nodes_op("acquire", &[("name", &node.hostname)])
        .await
    {
        error!(node = %node.hostname, error = %e, "ACQUIRE");
        return Err(e.into());
    }
    Ok(())
}

/// Start deployment of an allocated node.
async fn deploy(
    client: &MaasClient,
    node: &MaasNode,
    options: &ProcessingOptions,
) -> Result<(), ActionError> {
    info!(node = %node.hostname, "DEPLOY");
    rename_if_configured(client, node, options).await;

    if !options.preview {
        if let Err(e) = client
            .node_op(
                &node.system_id,
                "start",
                &[("distro_series", &options.distro_series)],
            )
            .await
        {
            error!(node = %node.hostname, error = %e, "DEPLOY");
            return Err(e.into());
        }
    }
    Ok(())
}

/// Ensure a deployed node has post-deployment provisioning in flight.
async fn provision(
    client: &MaasClient,
    node: &MaasNode,
    options: &ProcessingOptions,
) -> Result<(), ActionError> {
    debug!(node = %node.hostname, "CHECK PROVISION");
    rename_if_configured(client, node, options).await;

    let record = match options.provisioner.get(&node.system_id).await {
        Ok(record) => record,
        Err(e) => {
            warn!(node = %node.hostname, error = %e,
                "unable to retrieve provisioning state of node");
            return Ok(());
        }
    };

    match record {
        None => submit_provision(node, options, "NotFound").await,
        Some(record) if record.status == TaskStatus::Failed => {
            submit_provision(node, options, "FAILED").await
        }
        Some(record)
            if record.status == TaskStatus::Running
                && !options.provision_ttl.is_zero()
                && age(record.timestamp) > options.provision_ttl =>
        {
            error!(node = %node.hostname, ttl = ?options.provision_ttl,
                "provisioning of node has passed the provisioning TTL");
            if let Err(e) = options.provisioner.clear(&node.system_id).await {
                error!(node = %node.system_id, error = %e,
                    "unable to clear expired provisioning record");
            }
            Ok(())
        }
        Some(record) => {
            debug!(node = %node.hostname, state = %record.status,
                "not invoking provisioning");
            Ok(())
        }
    }
}

async fn submit_provision(
    node: &MaasNode,
    options: &ProcessingOptions,
    current: &str,
) -> Result<(), ActionError> {
    debug!(node = %node.hostname, state = %current, "current provisioning state of node");

    let ips = node.ips();
    let ip = match ips.first() {
        Some(ip) => ip.clone(),
        None => {
            // The provisioner requires an IP, so when MAAS has not reported
            // one attempt to resolve the hostname independently.
            debug!(node = %node.hostname,
                "MAAS did not return an IP address, attempting to resolve independently");
            resolve_hostname(&node.hostname).await.ok_or_else(|| {
                error!(node = %node.hostname,
                    "unable to determine IP address, thus unable to provision node");
                ActionError::NoAddress(node.hostname.clone())
            })?
        }
    };

    let mac = node.macs().first().cloned().unwrap_or_default();
    let request = RequestInfo {
        id: node.system_id.clone(),
        name: node.hostname.clone(),
        ip,
        mac,
        ..Default::default()
    };

    if let Err(e) = options.provisioner.provision(&request).await {
        error!(node = %node.hostname, id = %node.system_id, error = %e,
            "unable to provision node");
    }
    Ok(())
}

async fn resolve_hostname(hostname: &str) -> Option<String> {
    let mut addrs = tokio::net::lookup_host((hostname, 0)).await.ok()?;
    addrs.next().map(|addr| addr.ip().to_string())
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

    #[test]
    fn test_action_display_names() {
        assert_eq!(Action::Commission.to_string(), "Commission");
        assert_eq!(Action::AdminState.to_string(), "AdminState");
    }

    #[test]
    fn test_age_of_recent_timestamp_is_small() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        assert!(age(now - 5) >= Duration::from_secs(5));
        assert!(age(now - 5) < Duration::from_secs(60));
    }

    #[test]
    fn test_power_info_parses_helper_output() {
        let info: PowerInfo = serde_json::from_str(
            r#"{"name":"amt","mac_address":"AA:BB:CC:DD:EE:01",
                "power_password":"secret","power_address":"10.0.0.9"}"#,
        )
        .unwrap();
        assert_eq!(info.name, "amt");
        assert_eq!(info.power_address, "10.0.0.9");
    }
}
