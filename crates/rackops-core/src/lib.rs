//! Shared core for the rackops services.
//!
//! Every service in the workspace is built from the same parts:
//! - `maas`: a client for the MAAS REST API and the node/device/subnet types
//! - `provision`: the provisioning status vocabulary and the client used by
//!   `flow` and `switchq` to talk to the provisioner
//! - `storage`: the pluggable `Put/Get/Delete/List` status store
//! - `vendors`: the switch vendor OUI table
//! - `address`: harvested address sources
//! - `config`: environment-driven configuration helpers
//! - `observability`: tracing and metrics initialization

pub mod address;
pub mod config;
pub mod maas;
pub mod observability;
pub mod provision;
pub mod storage;
pub mod vendors;
