//! Harvester REST surface
//!
//! - `GET /lease/` list all published leases
//! - `GET /lease/{ip}` one lease by IP
//! - `GET /lease/hardware/{mac}` one lease by hardware address
//! - `GET /lease/hostname/{name}` one lease by hostname
//! - `POST /harvest/` trigger a parse; answers `{"response": "OK"|"QUIET"}`
//! - `GET /metrics` Prometheus registry

use crate::lease::Lease;
use crate::sync::{HarvestOutcome, HarvestRequest, Harvester};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rackops_core::observability::metrics;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub harvester: Arc<Harvester>,
    pub requests: mpsc::Sender<HarvestRequest>,
}

#[derive(Debug, Serialize)]
struct HarvestResponse {
    response: &'static str,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/lease/", get(list_leases))
        .route("/lease/{ip}", get(get_lease))
        .route("/lease/hardware/{mac}", get(get_lease_by_hardware))
        .route("/lease/hostname/{name}", get(get_lease_by_hostname))
        .route("/harvest/", post(do_harvest))
        .route("/harvest", post(do_harvest))
        .route("/metrics", get(serve_metrics))
        .with_state(state)
}

async fn serve_metrics() -> impl IntoResponse {
    metrics::render()
}

async fn list_leases(State(state): State<AppState>) -> Json<Vec<Lease>> {
    let maps = state.harvester.maps.read().await;
    Json(maps.by_ip.values().cloned().collect())
}

fn lease_response(lease: Option<Lease>) -> axum::response::Response {
    match lease {
        Some(lease) => Json(lease).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn get_lease(State(state): State<AppState>, Path(ip): Path<String>) -> impl IntoResponse {
    if ip.trim().is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let maps = state.harvester.maps.read().await;
    lease_response(maps.by_ip.get(&ip).cloned())
}

async fn get_lease_by_hardware(
    State(state): State<AppState>,
    Path(mac): Path<String>,
) -> impl IntoResponse {
    if mac.trim().is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let maps = state.harvester.maps.read().await;
    lease_response(maps.by_mac.get(&mac.to_lowercase()).cloned())
}

async fn get_lease_by_hostname(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if name.trim().is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let maps = state.harvester.maps.read().await;
    lease_response(maps.by_hostname.get(&name).cloned())
}

async fn do_harvest(State(state): State<AppState>) -> impl IntoResponse {
    info!("manual harvest invocation");
    let (tx, rx) = oneshot::channel();
    if state
        .requests
        .send(HarvestRequest { response: tx })
        .await
        .is_err()
    {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let timeout = state.harvester.config.request_timeout;
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(HarvestOutcome::Harvested)) => {
            Json(HarvestResponse { response: "OK" }).into_response()
        }
        Ok(Ok(HarvestOutcome::Quiet)) => {
            Json(HarvestResponse { response: "QUIET" }).into_response()
        }
        Ok(Err(_)) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Err(_) => {
            error!("request to process DHCP lease file timed out");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
