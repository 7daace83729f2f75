//! Provisioner REST surface
//!
//! - `POST /provision/` submit a request (202 Accepted)
//! - `GET /provision/` list all status records
//! - `GET /provision/{id}` query one; the status code encodes the state
//!   (Pending/Running → 202, Complete/Failed → 200)
//! - `DELETE /provision/{id}` clear a record
//! - `GET /metrics` Prometheus registry

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rackops_core::observability::metrics;
use rackops_core::provision::{RequestInfo, TaskStatus, WorkRequest};
use rackops_core::storage::Storage;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn Storage>,
    pub dispatcher: Dispatcher,
    pub http: reqwest::Client,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/provision/", get(list_requests).post(submit_request))
        .route("/provision/{id}", get(query_status).delete(delete_status))
        .route("/metrics", get(serve_metrics))
        .with_state(state)
}

async fn serve_metrics() -> impl IntoResponse {
    metrics::render()
}

/// Resolve the role for a request: explicit field, then selector URL, then
/// the configured default. The selector answers with a single-line role
/// name; a blank response falls back to the default.
async fn resolve_role(state: &AppState, info: &RequestInfo) -> Result<String, reqwest::Error> {
    if !info.role.is_empty() {
        return Ok(info.role.clone());
    }

    let selector = if !info.role_selector.is_empty() {
        info.role_selector.clone()
    } else {
        state.config.role_selector_url.clone()
    };
    if selector.is_empty() {
        return Ok(state.config.default_role.clone());
    }

    let body = state.http.get(&selector).send().await?.text().await?;
    let role = body.lines().next().unwrap_or("").trim();
    if role.is_empty() {
        Ok(state.config.default_role.clone())
    } else {
        Ok(role.to_string())
    }
}

async fn submit_request(
    State(state): State<AppState>,
    payload: Result<Json<RequestInfo>, JsonRejection>,
) -> impl IntoResponse {
    let Json(info) = match payload {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "unable to decode request to provision");
            return (StatusCode::BAD_REQUEST, e.body_text()).into_response();
        }
    };

    if !info.is_valid() {
        error!(name = %info.name, "provisioning request not valid");
        return StatusCode::BAD_REQUEST.into_response();
    }

    let role = match resolve_role(&state, &info).await {
        Ok(role) => role,
        Err(e) => {
            error!(name = %info.name, error = %e,
                "unable to get provisioning role for node");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    // An explicit script on the request overrides the configured default.
    let script = if info.script.is_empty() {
        state.config.script.clone()
    } else {
        info.script.clone()
    };

    if let Err(e) = state.dispatcher.dispatch(WorkRequest { info, script, role }) {
        error!(error = %e, "unable to dispatch provisioning request");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    StatusCode::ACCEPTED.into_response()
}

async fn list_requests(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.list().await {
        Ok(list) => Json(list).into_response(),
        Err(e) => {
            error!(error = %e, "unable to list status records");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn query_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if id.trim().is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    match state.storage.get(&id).await {
        Ok(Some(msg)) => {
            let code = match msg.status {
                TaskStatus::Pending | TaskStatus::Running => StatusCode::ACCEPTED,
                TaskStatus::Complete | TaskStatus::Failed => StatusCode::OK,
            };
            (code, Json(msg)).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(id = %id, error = %e, "error while retrieving status from storage");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn delete_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if id.trim().is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    match state.storage.delete(&id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            error!(id = %id, error = %e, "error while deleting status from storage");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rackops_core::storage::MemoryStorage;
    use std::time::Duration;

    async fn spawn_app(config: Config) -> (String, Arc<dyn Storage>) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let dispatcher = Dispatcher::start(config.number_of_workers, storage.clone());
        let state = AppState {
            config: Arc::new(config),
            storage: storage.clone(),
            dispatcher,
            http: reqwest::Client::new(),
        };
        let app = create_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), storage)
    }

    fn config() -> Config {
        Config {
            port: 0,
            listen: "127.0.0.1".into(),
            role_selector_url: String::new(),
            default_role: "compute-node".into(),
            script: "true".into(),
            storage_url: "memory:".into(),
            number_of_workers: 2,
        }
    }

    #[tokio::test]
    async fn test_fresh_submit_reaches_complete() {
        let (base, _storage) = spawn_app(config()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/provision/"))
            .json(&serde_json::json!({
                "id": "n1", "name": "h1", "ip": "10.0.0.5", "mac": "AA:BB:CC:DD:EE:01"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

        // Poll until the record settles in Complete with a 200.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let resp = client
                .get(format!("{base}/provision/n1"))
                .send()
                .await
                .unwrap();
            if resp.status() == reqwest::StatusCode::OK {
                let msg: rackops_core::provision::StatusMsg = resp.json().await.unwrap();
                assert_eq!(msg.status, TaskStatus::Complete);
                assert_eq!(msg.request.role, "compute-node");
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "record never completed"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_blank_fields_are_rejected() {
        let (base, _storage) = spawn_app(config()).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/provision/"))
            .json(&serde_json::json!({ "id": "n1", "name": "h1", "ip": " ", "mac": "m" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (base, _storage) = spawn_app(config()).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/provision/"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_absent_record_is_not_found() {
        let (base, _storage) = spawn_app(config()).await;
        let resp = reqwest::Client::new()
            .get(format!("{base}/provision/ghost"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_clears_record() {
        let (base, _storage) = spawn_app(config()).await;
        let client = reqwest::Client::new();

        client
            .post(format!("{base}/provision/"))
            .json(&serde_json::json!({
                "id": "n1", "name": "h1", "ip": "10.0.0.5", "mac": "AA:BB:CC:DD:EE:01"
            }))
            .send()
            .await
            .unwrap();

        // Give the pipeline a moment to write the record.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let status = client
                .get(format!("{base}/provision/n1"))
                .send()
                .await
                .unwrap()
                .status();
            if status != reqwest::StatusCode::NOT_FOUND {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let resp = client
            .delete(format!("{base}/provision/n1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let resp = client
            .get(format!("{base}/provision/n1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_role_selector_url_is_consulted() {
        // Stub selector that answers with a one-line role name.
        let selector_app = Router::new().route("/role", get(|| async { "switch-role\n" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let selector_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, selector_app).await.unwrap();
        });

        let mut cfg = config();
        cfg.role_selector_url = format!("http://{selector_addr}/role");
        let (base, storage) = spawn_app(cfg).await;

        reqwest::Client::new()
            .post(format!("{base}/provision/"))
            .json(&serde_json::json!({
                "id": "n1", "name": "h1", "ip": "10.0.0.5", "mac": "AA:BB:CC:DD:EE:01"
            }))
            .send()
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(msg) = storage.get("n1").await.unwrap() {
                assert_eq!(msg.request.role, "switch-role");
                break;
            }
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
