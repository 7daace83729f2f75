//! Allocator REST surface
//!
//! - `GET /allocations/{mac}` allocate (or return the sticky binding)
//! - `DELETE /allocations/{mac}` release
//! - `GET /allocations/` list all bindings
//! - `DELETE /addresses/{ip}` release whichever MAC holds the address
//! - `GET /metrics` Prometheus registry

use crate::pool::AddressPool;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rackops_core::observability::metrics;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<Mutex<AddressPool>>,
}

#[derive(Debug, Serialize)]
pub struct AllocationMsg {
    #[serde(rename = "Mac")]
    pub mac: String,
    #[serde(rename = "Ip")]
    pub ip: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorMsg {
    #[serde(rename = "Error")]
    pub error: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/allocations/", get(list_allocations))
        .route("/allocations/{mac}", get(allocate).delete(release))
        .route("/addresses/{ip}", axum::routing::delete(free_address))
        .route("/metrics", get(serve_metrics))
        .with_state(state)
}

async fn serve_metrics() -> impl IntoResponse {
    metrics::render()
}

async fn allocate(State(state): State<AppState>, Path(mac): Path<String>) -> impl IntoResponse {
    let mut pool = state.pool.lock().await;
    match pool.allocate(&mac) {
        Ok(ip) => {
            info!(mac = %mac, ip = %ip, "allocated");
            metrics::set_addresses_allocated(pool.allocated_count());
            Json(AllocationMsg {
                mac,
                ip: ip.to_string(),
            })
            .into_response()
        }
        Err(e) => {
            error!(mac = %mac, error = %e, "unable to allocate address");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorMsg {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn release(State(state): State<AppState>, Path(mac): Path<String>) -> impl IntoResponse {
    let mut pool = state.pool.lock().await;
    if let Some(ip) = pool.release(&mac) {
        info!(mac = %mac, ip = %ip, "released");
    }
    metrics::set_addresses_allocated(pool.allocated_count());
    StatusCode::OK
}

async fn list_allocations(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.pool.lock().await;
    let list: Vec<AllocationMsg> = pool
        .allocations()
        .into_iter()
        .map(|(mac, ip)| AllocationMsg {
            mac,
            ip: ip.to_string(),
        })
        .collect();
    Json(list)
}

async fn free_address(State(state): State<AppState>, Path(ip): Path<String>) -> impl IntoResponse {
    let parsed: Ipv4Addr = match ip.parse() {
        Ok(ip) => ip,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let mut pool = state.pool.lock().await;
    match pool.release_ip(parsed) {
        Some(mac) => {
            info!(mac = %mac, ip = %ip, "released by address");
            metrics::set_addresses_allocated(pool.allocated_count());
            StatusCode::OK.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
