//! Transition table and node processing
//!
//! The table maps (target status, current status) to the ordered action list
//! that moves a node one step closer. The only shipped target is Deployed.
//! A missing cell is a surfaced error, never a mutation.

use crate::actions::{Action, ProcessingOptions};
use rackops_core::maas::{MaasClient, MaasNode, NodeStatus};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("could not find transition to target state '{0}'")]
    UnknownTarget(NodeStatus),
    #[error(transparent)]
    UnknownStatus(#[from] rackops_core::maas::UnknownStatus),
}

/// Look up the action list for a (target, current) pair.
///
/// Hand compiled from the lifecycle graph: every non-terminal current status
/// resets bookkeeping and then advances; the (Deployed, Deployed) cell runs
/// post-deployment provisioning.
pub fn actions_for(
    target: NodeStatus,
    current: NodeStatus,
) -> Result<&'static [Action], FlowError> {
    use Action::*;
    use NodeStatus as S;

    if target != S::Deployed {
        return Err(FlowError::UnknownTarget(target));
    }

    Ok(match current {
        S::New => &[Reset, Commission],
        S::Deployed => &[Provision, Done],
        S::Ready => &[Reset, Acquire],
        S::Allocated => &[Reset, Deploy],
        S::Retired => &[Reset, AdminState],
        S::Reserved => &[Reset, AdminState],
        S::Releasing => &[Reset, Wait],
        S::DiskErasing => &[Reset, Wait],
        S::Deploying => &[Reset, Wait],
        S::Commissioning => &[Reset, Wait],
        S::Missing => &[Reset, Fail],
        S::FailedReleasing => &[Reset, Fail],
        S::FailedDiskErasing => &[Reset, Fail],
        S::FailedDeployment => &[Reset, Fail],
        S::Broken => &[Reset, Fail],
        S::FailedCommissioning => &[Reset, Fail],
    })
}

/// Apply an action list in order, stopping on the first error.
pub async fn process_actions(
    client: &MaasClient,
    node: &MaasNode,
    options: &ProcessingOptions,
    actions: &[Action],
) {
    for action in actions {
        if let Err(e) = action.apply(client, node, options).await {
            error!(node = %node.hostname, action = %action, error = %e,
                "error while processing action for node");
            break;
        }
    }
}

/// Select and run the action sequence for one node.
///
/// In non-preview mode the sequence runs in its own task so a slow node
/// cannot starve the rest of the cycle; errors within the task are logged.
pub async fn process_node(
    client: &MaasClient,
    node: MaasNode,
    options: &ProcessingOptions,
) -> Result<(), FlowError> {
    let status = node.status()?;
    let actions = actions_for(NodeStatus::Deployed, status)?;

    if options.preview {
        process_actions(client, &node, options, actions).await;
    } else {
        let client = client.clone();
        let options = options.clone();
        tokio::spawn(async move {
            process_actions(&client, &node, &options, actions).await;
        });
    }
    Ok(())
}

/// Run one poll cycle over the full node listing, applying the host and
/// zone include filters.
pub async fn process_all(client: &MaasClient, nodes: Vec<MaasNode>, options: &ProcessingOptions) {
    for node in nodes {
        if !options.filter.matches_host(&node.hostname) {
            debug!(node = %node.hostname,
                "ignoring node, it did not match the include hostname filter");
            continue;
        }
        if !options.filter.matches_zone(node.zone_name()) {
            debug!(node = %node.hostname, zone = %node.zone_name(),
                "ignoring node, its zone did not match the include zone filter");
            continue;
        }
        let hostname = node.hostname.clone();
        if let Err(e) = process_node(client, node, options).await {
            error!(node = %hostname, error = %e, "unable to process node");
        }
    }
}
