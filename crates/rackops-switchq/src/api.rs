//! switchq REST surface
//!
//! - `GET /switch/` returns the current publish list
//! - `GET /metrics` Prometheus registry

use crate::poller::PublishList;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rackops_core::address::AddressRec;
use rackops_core::observability::metrics;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub publish: Arc<PublishList>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/switch/", get(list_switches))
        .route("/metrics", get(serve_metrics))
        .with_state(state)
}

async fn serve_metrics() -> impl IntoResponse {
    metrics::render()
}

async fn list_switches(State(state): State<AppState>) -> Json<Vec<AddressRec>> {
    let records = state.publish.records.read().await;
    Json(records.clone())
}
