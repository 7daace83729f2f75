//! Configuration generation endpoint
//!
//! `POST /config/` accepts optional expected switch and host counts, pulls
//! the current topology from the controller, and renders the fabric network
//! configuration document. A count of zero skips validation.

use crate::onos::{
    chassis_mac, edge_routers, gateway, vlan, ControllerClient, OnosDevice, OnosHost, OnosLink,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rackops_core::observability::metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub controller: ControllerClient,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, rename = "switchcount")]
    pub switch_count: usize,
    #[serde(default, rename = "hostcount")]
    pub host_count: usize,
}

#[derive(Debug, Serialize)]
struct DeviceEntry {
    mac: String,
    #[serde(rename = "isEdgeRouter")]
    is_edge_router: bool,
    #[serde(rename = "managementAddress", skip_serializing_if = "String::is_empty")]
    management_address: String,
}

#[derive(Debug, Serialize)]
struct HostEntry {
    mac: String,
    ips: Vec<String>,
    location: String,
    port: String,
    gateway: String,
    vlan: String,
}

#[derive(Debug, Serialize)]
struct LinkEntry {
    src: String,
    #[serde(rename = "srcPort")]
    src_port: String,
    dst: String,
    #[serde(rename = "dstPort")]
    dst_port: String,
}

/// The generated fabric configuration document.
#[derive(Debug, Serialize)]
struct FabricConfig {
    devices: BTreeMap<String, DeviceEntry>,
    hosts: BTreeMap<String, HostEntry>,
    links: Vec<LinkEntry>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/config/", post(generate_config))
        .route("/metrics", get(serve_metrics))
        .with_state(state)
}

async fn serve_metrics() -> impl IntoResponse {
    metrics::render()
}

fn build_config(
    devices: Vec<OnosDevice>,
    hosts: Vec<OnosHost>,
    links: Vec<OnosLink>,
) -> FabricConfig {
    let edges = edge_routers(&hosts);

    let devices = devices
        .into_iter()
        .map(|device| {
            let entry = DeviceEntry {
                mac: chassis_mac(&device.chassis_id),
                is_edge_router: edges.contains_key(&device.id),
                management_address: device.annotations.management_address,
            };
            (device.id, entry)
        })
        .collect();

    let hosts = hosts
        .into_iter()
        .map(|host| {
            let entry = HostEntry {
                mac: host.mac,
                gateway: gateway(&host.ip_addresses),
                vlan: vlan(&host.ip_addresses),
                ips: host.ip_addresses,
                location: host.location.element_id,
                port: host.location.port,
            };
            (host.id, entry)
        })
        .collect();

    let links = links
        .into_iter()
        .map(|link| LinkEntry {
            src: link.src.device,
            src_port: link.src.port,
            dst: link.dst.device,
            dst_port: link.dst.port,
        })
        .collect();

    FabricConfig {
        devices,
        hosts,
        links,
    }
}

async fn generate_config(
    State(state): State<AppState>,
    payload: Result<Json<GenerationOptions>, JsonRejection>,
) -> impl IntoResponse {
    let Json(options) = match payload {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "unable to decode generation request options");
            return (StatusCode::BAD_REQUEST, e.body_text()).into_response();
        }
    };

    let devices = match state.controller.devices().await {
        Ok(devices) => devices.devices,
        Err(e) => {
            error!(error = %e, "unable to retrieve device information from controller");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    if options.switch_count > 0 && devices.len() != options.switch_count {
        error!(expected = options.switch_count, found = devices.len(),
            "switch count mismatch, no configuration generated");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "expected switch count mismatch",
        )
            .into_response();
    }

    let hosts = match state.controller.hosts().await {
        Ok(hosts) => hosts.hosts,
        Err(e) => {
            error!(error = %e, "unable to retrieve host information from controller");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    if options.host_count > 0 && hosts.len() != options.host_count {
        error!(expected = options.host_count, found = hosts.len(),
            "host count mismatch, no configuration generated");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "expected host count mismatch",
        )
            .into_response();
    }

    let links = match state.controller.links().await {
        Ok(links) => links.links,
        Err(e) => {
            error!(error = %e, "unable to retrieve link information from controller");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    Json(build_config(devices, hosts, links)).into_response()
}
