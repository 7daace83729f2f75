//! Observability
//!
//! Tracing (structured logging) and Prometheus metrics shared by all
//! services.

pub mod metrics;
pub mod tracing;

pub use self::tracing::{init_tracing, TracingConfig};
