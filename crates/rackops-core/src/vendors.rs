//! Switch vendor OUI table
//!
//! Loaded from a JSON array of `{prefix, vendor, provision}` records, where
//! `prefix` is an uppercase colon-delimited OUI (or a full MAC). A host is a
//! managed switch iff its MAC matches an entry with `provision` true; a full
//! 17-character match takes precedence over the 8-character OUI match.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VendorError {
    #[error("invalid vendors URL '{0}'")]
    InvalidUrl(String),
    #[error("unsupported vendors scheme '{0}'")]
    UnknownScheme(String),
    #[error("unable to read vendors file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to fetch vendors: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unable to parse vendors data: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorRec {
    pub prefix: String,
    pub vendor: String,
    pub provision: bool,
}

/// Vendor lookup table keyed by uppercase prefix.
#[derive(Debug, Clone, Default)]
pub struct Vendors {
    table: HashMap<String, VendorRec>,
}

impl Vendors {
    /// Load the table from a `file://` path or `http(s)://` URL.
    pub async fn load(spec: &str) -> Result<Self, VendorError> {
        let url =
            url::Url::parse(spec).map_err(|_| VendorError::InvalidUrl(spec.to_string()))?;
        let raw = match url.scheme() {
            "file" => tokio::fs::read_to_string(url.path()).await?,
            "http" | "https" => reqwest::get(spec).await?.text().await?,
            scheme => return Err(VendorError::UnknownScheme(scheme.to_string())),
        };
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, VendorError> {
        let records: Vec<VendorRec> = serde_json::from_str(raw)?;
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: Vec<VendorRec>) -> Self {
        let table = records
            .into_iter()
            .map(|rec| (rec.prefix.clone(), rec))
            .collect();
        Self { table }
    }

    /// Whether the MAC identifies a switch we manage.
    ///
    /// A full MAC entry is probed first; entries with `provision` false make
    /// the host recognized but skipped.
    pub fn is_switch(&self, mac: &str) -> bool {
        if mac.len() == 17 {
            if let Some(rec) = self.table.get(&mac.to_uppercase()) {
                return rec.provision;
            }
        }
        if mac.len() >= 8 {
            if let Some(rec) = self.table.get(&mac[0..8].to_uppercase()) {
                return rec.provision;
            }
        }
        false
    }
}
