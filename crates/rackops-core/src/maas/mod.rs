//! MAAS REST client
//!
//! A thin client over the MAAS v1.0 API surface the services consume:
//! node listing and operations, device enrollment, interface link management,
//! and subnet listing. Authentication is OAuth 1.0 PLAINTEXT with the usual
//! MAAS `consumer:token:secret` API key.

mod node;

pub use node::{
    Interface, Link, LinkSubnet, MaasDevice, MaasNode, MaasSubnet, MacEntry, NodeStatus,
    UnknownStatus, Zone,
};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum MaasError {
    #[error("invalid MAAS API key, expected 'consumer:token:secret'")]
    InvalidKey,
    #[error("invalid MAAS URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("MAAS request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("MAAS returned {0} for {1}")]
    Status(StatusCode, String),
    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatus),
}

/// Client for a single MAAS controller.
#[derive(Debug, Clone)]
pub struct MaasClient {
    root: Url,
    consumer_key: String,
    token_key: String,
    token_secret: String,
    http: reqwest::Client,
}

impl MaasClient {
    /// Create a client for `base` (e.g. `http://localhost/MAAS`) using the
    /// given API key and version.
    pub fn new(base: &str, api_key: &str, api_version: &str) -> Result<Self, MaasError> {
        let mut parts = api_key.trim().splitn(3, ':');
        let (consumer_key, token_key, token_secret) =
            match (parts.next(), parts.next(), parts.next()) {
                (Some(c), Some(t), Some(s)) if !t.is_empty() => {
                    (c.to_string(), t.to_string(), s.to_string())
                }
                _ => return Err(MaasError::InvalidKey),
            };

        let root = Url::parse(&format!(
            "{}/api/{}/",
            base.trim_end_matches('/'),
            api_version
        ))?;

        Ok(Self {
            root,
            consumer_key,
            token_key,
            token_secret,
            http: reqwest::Client::new(),
        })
    }

    /// OAuth 1.0 PLAINTEXT authorization header.
    fn auth_header(&self) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let nonce = uuid::Uuid::new_v4();
        format!(
            "OAuth oauth_version=\"1.0\", oauth_signature_method=\"PLAINTEXT\", \
             oauth_nonce=\"{nonce}\", oauth_timestamp=\"{timestamp}\", \
             oauth_consumer_key=\"{consumer}\", oauth_token=\"{token}\", \
             oauth_signature=\"&{secret}\"",
            consumer = self.consumer_key,
            token = self.token_key,
            secret = self.token_secret,
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url, MaasError> {
        Ok(self.root.join(path)?)
    }

    /// Join a `resource_uri` returned by MAAS (an absolute path) back onto
    /// the controller origin.
    fn resource(&self, resource_uri: &str) -> Result<Url, MaasError> {
        Ok(self.root.join(resource_uri)?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        op: Option<&str>,
    ) -> Result<T, MaasError> {
        let mut url = self.endpoint(path)?;
        if let Some(op) = op {
            url.query_pairs_mut().append_pair("op", op);
        }
        let resp = self
            .http
            .get(url.clone())
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(MaasError::Status(resp.status(), url.to_string()));
        }
        Ok(resp.json().await?)
    }

    async fn post_form(
        &self,
        url: Url,
        op: &str,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, MaasError> {
        let mut url = url;
        url.query_pairs_mut().append_pair("op", op);
        let resp = self
            .http
            .post(url.clone())
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .form(params)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(MaasError::Status(resp.status(), url.to_string()));
        }
        Ok(resp)
    }

    async fn put_form(&self, url: Url, params: &[(&str, &str)]) -> Result<(), MaasError> {
        let resp = self
            .http
            .put(url.clone())
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .form(params)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(MaasError::Status(resp.status(), url.to_string()));
        }
        Ok(())
    }

    /// List all nodes known to MAAS.
    pub async fn list_nodes(&self) -> Result<Vec<MaasNode>, MaasError> {
        self.get_json("nodes/", Some("list")).await
    }

    /// Issue a node operation (`stop`, `commission`, `start`, ...).
    pub async fn node_op(
        &self,
        system_id: &str,
        op: &str,
        params: &[(&str, &str)],
    ) -> Result<(), MaasError> {
        let url = self.endpoint(&format!("nodes/{system_id}/"))?;
        self.post_form(url, op, params).await?;
        Ok(())
    }

    /// Issue an operation on the nodes collection (`acquire`).
    pub async fn nodes_op(&self, op: &str, params: &[(&str, &str)]) -> Result<(), MaasError> {
        let url = self.endpoint("nodes/")?;
        self.post_form(url, op, params).await?;
        Ok(())
    }

    /// Update node attributes (hostname, power settings).
    pub async fn update_node(
        &self,
        system_id: &str,
        params: &[(&str, &str)],
    ) -> Result<(), MaasError> {
        let url = self.endpoint(&format!("nodes/{system_id}/"))?;
        self.put_form(url, params).await
    }

    /// List a node's interfaces.
    pub async fn list_interfaces(&self, system_id: &str) -> Result<Vec<Interface>, MaasError> {
        self.get_json(&format!("nodes/{system_id}/interfaces/"), None)
            .await
    }

    /// Issue an interface operation (`unlink_subnet`, `link_subnet`).
    pub async fn interface_op(
        &self,
        system_id: &str,
        interface_id: i64,
        op: &str,
        params: &[(&str, &str)],
    ) -> Result<(), MaasError> {
        let url = self.endpoint(&format!("nodes/{system_id}/interfaces/{interface_id}/"))?;
        self.post_form(url, op, params).await?;
        Ok(())
    }

    /// List all devices known to MAAS.
    pub async fn list_devices(&self) -> Result<Vec<MaasDevice>, MaasError> {
        self.get_json("devices/", Some("list")).await
    }

    /// Enroll a new device with a hostname and MAC address.
    pub async fn create_device(
        &self,
        hostname: &str,
        mac: &str,
    ) -> Result<MaasDevice, MaasError> {
        let url = self.endpoint("devices/")?;
        let resp = self
            .post_form(url, "new", &[("hostname", hostname), ("mac_addresses", mac)])
            .await?;
        Ok(resp.json().await?)
    }

    /// Update an object addressed by the `resource_uri` MAAS handed back.
    pub async fn update_resource(
        &self,
        resource_uri: &str,
        params: &[(&str, &str)],
    ) -> Result<(), MaasError> {
        let url = self.resource(resource_uri)?;
        self.put_form(url, params).await
    }

    /// List all subnets.
    pub async fn list_subnets(&self) -> Result<Vec<MaasSubnet>, MaasError> {
        self.get_json("subnets/", None).await
    }
}
