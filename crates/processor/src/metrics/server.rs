//! HTTP endpoint for scraping and checking the engine
//!
//! - `/metrics`: OpenMetrics text of the shared registry
//! - `/health`: liveness plus a snapshot of the engine gauges
//! - `/ready`: 200 while the engine accepts samples, 503 otherwise

use super::engine::EngineMetrics;
use super::registry::MetricsRegistry;
use super::MetricsError;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Where the metrics endpoint listens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl MetricsServerConfig {
    pub fn new(bind_address: impl Into<String>, port: u16) -> Self {
        Self {
            bind_address: bind_address.into(),
            port,
        }
    }

    /// Parse the bind address, which must be a literal IP
    pub fn socket_addr(&self) -> Result<SocketAddr, MetricsError> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| MetricsError::BindError {
                address: self.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            })
    }
}

impl std::fmt::Display for MetricsServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.bind_address, self.port)
    }
}

/// Whether the engine is currently accepting samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Running,
    Stopped,
}

/// Body of `/health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineHealth {
    pub state: EngineState,
    pub version: String,
    pub uptime_seconds: u64,
    pub watermark_ms: i64,
    pub open_windows: i64,
    pub results_emitted: u64,
    pub samples_late: u64,
    pub shard_restarts: u64,
}

impl EngineHealth {
    pub fn snapshot(metrics: &EngineMetrics, running: bool, uptime: Duration) -> Self {
        Self {
            state: if running {
                EngineState::Running
            } else {
                EngineState::Stopped
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
            watermark_ms: metrics.current_watermark.get(),
            open_windows: metrics.open_windows.get(),
            results_emitted: metrics.results_emitted.get(),
            samples_late: metrics.samples_late.get(),
            shard_restarts: metrics.shard_restarts.get(),
        }
    }
}

#[derive(Clone)]
struct ServerState {
    registry: Arc<MetricsRegistry>,
    metrics: Arc<EngineMetrics>,
    ready: Arc<AtomicBool>,
    started: Instant,
}

/// Serves the engine's metrics, health and readiness until cancelled
pub struct MetricsServer {
    config: MetricsServerConfig,
    registry: Arc<MetricsRegistry>,
    metrics: Arc<EngineMetrics>,
    ready: Arc<AtomicBool>,
}

impl MetricsServer {
    /// `metrics` should be the instance registered into `registry`
    pub fn new(
        config: MetricsServerConfig,
        registry: Arc<MetricsRegistry>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            config,
            registry,
            metrics,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Readiness flag shared with the running engine
    pub fn with_readiness(mut self, ready: Arc<AtomicBool>) -> Self {
        self.ready = ready;
        self
    }

    pub fn config(&self) -> &MetricsServerConfig {
        &self.config
    }

    fn router(&self) -> Router {
        let state = ServerState {
            registry: Arc::clone(&self.registry),
            metrics: Arc::clone(&self.metrics),
            ready: Arc::clone(&self.ready),
            started: Instant::now(),
        };

        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .with_state(state)
    }

    pub async fn start(self, shutdown: CancellationToken) -> Result<(), MetricsError> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| MetricsError::BindError {
                address: self.config.to_string(),
                source,
            })?;
        let local = listener.local_addr().ok();
        info!(address = ?local, "Metrics server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| MetricsError::ServerStartError(e.to_string()))?;

        info!("Metrics server stopped");
        Ok(())
    }
}

async fn metrics_handler(State(state): State<ServerState>) -> Response {
    match state.registry.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler(State(state): State<ServerState>) -> Json<EngineHealth> {
    debug!("Health requested");
    Json(EngineHealth::snapshot(
        &state.metrics,
        state.ready.load(Ordering::Relaxed),
        state.started.elapsed(),
    ))
}

async fn ready_handler(State(state): State<ServerState>) -> StatusCode {
    if state.ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
