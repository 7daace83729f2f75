//! Pluggable status storage
//!
//! The provisioner persists one [`StatusMsg`] per request id through this
//! small `Put/Get/Delete/List` vocabulary. The backend is selected at config
//! time by URL scheme: `memory:` keeps records for the process lifetime,
//! `etcd://host:port` stores JSON values under `cord/provisioner/<id>`.
//! No backend-specific code appears outside this module.

use crate::provision::StatusMsg;
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use etcd_client::{Client, GetOptions};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Key prefix for records in the remote KV store.
const PREFIX: &str = "cord/provisioner/";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage URL '{0}'")]
    InvalidUrl(String),
    #[error("unknown storage scheme '{0}'")]
    UnknownScheme(String),
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),
    #[error("corrupt record for '{id}': {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Status record store keyed by request id. Updates are last-writer-wins.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(&self, id: &str, msg: StatusMsg) -> Result<(), StorageError>;
    async fn get(&self, id: &str) -> Result<Option<StatusMsg>, StorageError>;
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
    async fn list(&self) -> Result<Vec<StatusMsg>, StorageError>;
}

/// Construct the storage backend selected by `spec`.
pub async fn new_storage(spec: &str) -> Result<Box<dyn Storage>, StorageError> {
    let url = url::Url::parse(spec).map_err(|_| StorageError::InvalidUrl(spec.to_string()))?;
    match url.scheme().to_lowercase().as_str() {
        "memory" => Ok(Box::new(MemoryStorage::new())),
        "etcd" => {
            let host = url
                .host_str()
                .ok_or_else(|| StorageError::InvalidUrl(spec.to_string()))?;
            let port = url.port().unwrap_or(2379);
            let endpoint = format!("http://{host}:{port}");
            Ok(Box::new(EtcdStorage::connect(&endpoint).await?))
        }
        scheme => Err(StorageError::UnknownScheme(scheme.to_string())),
    }
}

/// In-memory store, for single-process deployments and tests.
pub struct MemoryStorage {
    data: RwLock<HashMap<String, StatusMsg>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, id: &str, msg: StatusMsg) -> Result<(), StorageError> {
        self.data.write().await.insert(id.to_string(), msg);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StatusMsg>, StorageError> {
        Ok(self.data.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.data.write().await.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StatusMsg>, StorageError> {
        Ok(self.data.read().await.values().cloned().collect())
    }
}

/// etcd-backed store. Values are the JSON encoding of [`StatusMsg`].
pub struct EtcdStorage {
    client: Arc<RwLock<Client>>,
}

impl EtcdStorage {
    /// Connect to etcd, retrying with exponential backoff so the service can
    /// come up alongside the store.
    pub async fn connect(endpoint: &str) -> Result<Self, StorageError> {
        let endpoint = endpoint.to_string();
        let client = backoff::future::retry(ExponentialBackoff::default(), || {
            let endpoint = endpoint.clone();
            async move {
                Client::connect([endpoint.as_str()], None).await.map_err(|e| {
                    warn!(endpoint = %endpoint, error = %e, "etcd connect failed, retrying");
                    backoff::Error::transient(e)
                })
            }
        })
        .await?;
        debug!(endpoint = %endpoint, "connected to etcd");
        Ok(Self {
            client: Arc::new(RwLock::new(client)),
        })
    }

    fn key(id: &str) -> String {
        format!("{PREFIX}{id}")
    }
}

#[async_trait]
impl Storage for EtcdStorage {
    async fn put(&self, id: &str, msg: StatusMsg) -> Result<(), StorageError> {
        let value = serde_json::to_vec(&msg).map_err(|source| StorageError::Corrupt {
            id: id.to_string(),
            source,
        })?;
        let mut client = self.client.write().await;
        client.put(Self::key(id), value, None).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<StatusMsg>, StorageError> {
        let mut client = self.client.write().await;
        let resp = client.get(Self::key(id), None).await?;
        match resp.kvs().first() {
            Some(kv) => {
                let msg = serde_json::from_slice(kv.value()).map_err(|source| {
                    StorageError::Corrupt {
                        id: id.to_string(),
                        source,
                    }
                })?;
                Ok(Some(msg))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut client = self.client.write().await;
        client.delete(Self::key(id), None).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StatusMsg>, StorageError> {
        let mut client = self.client.write().await;
        let resp = client
            .get(PREFIX, Some(GetOptions::new().with_prefix()))
            .await?;
        let mut result = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let id = kv
                .key_str()
                .map(|k| k.strip_prefix(PREFIX).unwrap_or(k).to_string())
                .unwrap_or_default();
            let msg =
                serde_json::from_slice(kv.value()).map_err(|source| StorageError::Corrupt {
                    id,
                    source,
                })?;
            result.push(msg);
        }
        Ok(result)
    }
}
