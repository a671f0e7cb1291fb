//! Prometheus metrics for the window engine
//!
//! [`EngineMetrics`] holds the engine's counters and gauges,
//! [`MetricsRegistry`] collects them for export and [`MetricsServer`] serves
//! them over HTTP together with health and readiness endpoints.

mod engine;
mod labels;
mod registry;
mod server;

pub use engine::EngineMetrics;
pub use labels::{RejectLabels, RejectReason};
pub use registry::MetricsRegistry;
pub use server::{EngineHealth, EngineState, MetricsServer, MetricsServerConfig};

use thiserror::Error;

/// Errors that can occur in the metrics subsystem
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Failed to start metrics server: {0}")]
    ServerStartError(String),

    #[error("Failed to bind to address {address}: {source}")]
    BindError {
        address: String,
        source: std::io::Error,
    },

    #[error("Metric encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;
