//! Harvested address sources
//!
//! `switchq` reads `{name, ip, mac}` records from an address source selected
//! by URL scheme. `file://` points at a harvest include file with
//! whitespace-separated columns (`name _ _ ip _ mac`); `http(s)://` fetches a
//! JSON array of records from a REST feed such as the harvester.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("invalid address source URL '{0}'")]
    InvalidUrl(String),
    #[error("unknown address source scheme '{0}'")]
    UnknownScheme(String),
    #[error("unable to read address file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to fetch addresses: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRec {
    pub name: String,
    pub ip: String,
    pub mac: String,
}

/// A queryable source of harvested addresses.
#[async_trait]
pub trait AddressSource: Send + Sync {
    async fn addresses(&self) -> Result<Vec<AddressRec>, AddressError>;
}

/// Construct the address source selected by `spec`.
pub fn new_address_source(spec: &str) -> Result<Box<dyn AddressSource>, AddressError> {
    let url = url::Url::parse(spec).map_err(|_| AddressError::InvalidUrl(spec.to_string()))?;
    match url.scheme() {
        "file" => Ok(Box::new(FileAddressSource {
            path: url.path().to_string(),
        })),
        "http" | "https" => Ok(Box::new(HttpAddressSource {
            url: spec.to_string(),
            http: reqwest::Client::new(),
        })),
        scheme => Err(AddressError::UnknownScheme(scheme.to_string())),
    }
}

/// Harvest include file. Only lines with exactly six fields are records.
pub struct FileAddressSource {
    path: String,
}

#[async_trait]
impl AddressSource for FileAddressSource {
    async fn addresses(&self) -> Result<Vec<AddressRec>, AddressError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(parse_harvest(&content))
    }
}

/// Parse harvest include content: `name _ _ ip _ mac` per line.
pub fn parse_harvest(content: &str) -> Vec<AddressRec> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() == 6 {
                Some(AddressRec {
                    name: parts[0].to_string(),
                    ip: parts[3].to_string(),
                    mac: parts[5].to_string(),
                })
            } else {
                None
            }
        })
        .collect()
}

/// REST feed returning a JSON array of address records.
pub struct HttpAddressSource {
    url: String,
    http: reqwest::Client,
}

#[async_trait]
impl AddressSource for HttpAddressSource {
    async fn addresses(&self) -> Result<Vec<AddressRec>, AddressError> {
        Ok(self.http.get(&self.url).send().await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_harvest_reads_six_field_lines() {
        let content = "\
leaf-1 IN A 10.6.0.2 ; AA:BB:CC:DD:EE:01
; a comment line
spine-1 IN A 10.6.0.3 ; AA:BB:CC:DD:EE:02
short line
";
        let records = parse_harvest(content);
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            AddressRec {
                name: "leaf-1".into(),
                ip: "10.6.0.2".into(),
                mac: "AA:BB:CC:DD:EE:01".into(),
            }
        );
        assert_eq!(records[1].mac, "AA:BB:CC:DD:EE:02");
    }

    #[tokio::test]
    async fn test_file_source_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "leaf-1 IN A 10.6.0.2 ; AA:BB:CC:DD:EE:01").unwrap();
        let spec = format!("file://{}", file.path().display());
        let source = new_address_source(&spec).unwrap();
        let records = source.addresses().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "leaf-1");
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        assert!(matches!(
            new_address_source("ftp://somewhere").err().unwrap(),
            AddressError::UnknownScheme(_)
        ));
    }
}
