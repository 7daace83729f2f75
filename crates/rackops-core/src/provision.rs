//! Provisioning status vocabulary and client
//!
//! The request/status types shared between the provisioner service and its
//! callers (`flow`, `switchq`), plus the HTTP client the callers use.
//! Statuses travel on the wire as integers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// Lifecycle state of a provisioning task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl From<TaskStatus> for u8 {
    fn from(status: TaskStatus) -> u8 {
        match status {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Complete => 2,
            TaskStatus::Failed => 3,
        }
    }
}

impl TryFrom<u8> for TaskStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TaskStatus::Pending),
            1 => Ok(TaskStatus::Running),
            2 => Ok(TaskStatus::Complete),
            3 => Ok(TaskStatus::Failed),
            other => Err(format!("invalid task status '{other}'")),
        }
    }
}

/// A provisioning request as submitted over REST.
///
/// `role_selector`, `role`, and `script` are optional overrides; blank means
/// "use the service configuration".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role_selector: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
}

impl RequestInfo {
    /// A request is valid when id, name, ip, and mac are all non-blank.
    pub fn is_valid(&self) -> bool {
        !(self.id.trim().is_empty()
            || self.name.trim().is_empty()
            || self.ip.trim().is_empty()
            || self.mac.trim().is_empty())
    }
}

/// A request with its resolved role and script, as handed to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub info: RequestInfo,
    pub script: String,
    pub role: String,
}

/// Durable status record for one provisioning task, keyed by request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMsg {
    pub request: WorkRequest,
    pub worker: i64,
    pub status: TaskStatus,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("no provisioner URL configured")]
    NoUrl,
    #[error("provisioner request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provisioner returned unexpected status {0}")]
    Status(StatusCode),
}

/// HTTP client for the provisioner's REST surface.
#[derive(Debug, Clone)]
pub struct ProvisionerClient {
    base: String,
    http: reqwest::Client,
}

impl ProvisionerClient {
    /// Create a client for the given base URL (e.g.
    /// `http://provisioner:4243/provision/`).
    pub fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base.is_empty()
    }

    fn record_url(&self, id: &str) -> String {
        if self.base.ends_with('/') {
            format!("{}{}", self.base, id)
        } else {
            format!("{}/{}", self.base, id)
        }
    }

    /// Fetch the status record for an id. Absence is `Ok(None)`, not an
    /// error.
    pub async fn get(&self, id: &str) -> Result<Option<StatusMsg>, ProvisionError> {
        if !self.is_configured() {
            return Err(ProvisionError::NoUrl);
        }
        let resp = self.http.get(self.record_url(id)).send().await?;
        match resp.status() {
            StatusCode::OK | StatusCode::ACCEPTED => Ok(Some(resp.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(ProvisionError::Status(other)),
        }
    }

    /// Submit a provisioning request; the provisioner answers 202 Accepted.
    pub async fn provision(&self, info: &RequestInfo) -> Result<(), ProvisionError> {
        if !self.is_configured() {
            return Err(ProvisionError::NoUrl);
        }
        let resp = self.http.post(&self.base).json(info).send().await?;
        if resp.status() != StatusCode::ACCEPTED {
            return Err(ProvisionError::Status(resp.status()));
        }
        Ok(())
    }

    /// Clear the status record for an id.
    pub async fn clear(&self, id: &str) -> Result<(), ProvisionError> {
        if !self.is_configured() {
            return Err(ProvisionError::NoUrl);
        }
        let resp = self.http.delete(self.record_url(id)).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(ProvisionError::Status(resp.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format_is_integer() {
        let json = serde_json::to_string(&TaskStatus::Running).unwrap();
        assert_eq!(json, "1");
        let status: TaskStatus = serde_json::from_str("3").unwrap();
        assert_eq!(status, TaskStatus::Failed);
        assert!(serde_json::from_str::<TaskStatus>("9").is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Pending.to_string(), "PENDING");
        assert_eq!(TaskStatus::Complete.to_string(), "COMPLETE");
    }

    #[test]
    fn test_request_validation() {
        let mut info = RequestInfo {
            id: "n1".into(),
            name: "h1".into(),
            ip: "10.0.0.5".into(),
            mac: "AA:BB:CC:DD:EE:01".into(),
            ..Default::default()
        };
        assert!(info.is_valid());
        info.ip = "   ".into();
        assert!(!info.is_valid());
    }

    #[test]
    fn test_record_url_join() {
        let with_slash = ProvisionerClient::new("http://p:4243/provision/");
        assert_eq!(with_slash.record_url("n1"), "http://p:4243/provision/n1");
        let without = ProvisionerClient::new("http://p:4243/provision");
        assert_eq!(without.record_url("n1"), "http://p:4243/provision/n1");
    }

    #[test]
    fn test_status_msg_round_trip() {
        let msg = StatusMsg {
            request: WorkRequest {
                info: RequestInfo {
                    id: "n1".into(),
                    name: "h1".into(),
                    ip: "10.0.0.5".into(),
                    mac: "AA:BB:CC:DD:EE:01".into(),
                    ..Default::default()
                },
                script: "do-ansible".into(),
                role: "compute-node".into(),
            },
            worker: 2,
            status: TaskStatus::Complete,
            message: String::new(),
            timestamp: 1_700_000_000,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: StatusMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, TaskStatus::Complete);
        assert_eq!(back.request.info.id, "n1");
    }
}
