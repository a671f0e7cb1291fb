//! Result emitter
//!
//! Drains finalized results from the shards, serializes them and delivers
//! them to the result sink. A result that cannot be serialized is replaced by
//! [`FALLBACK_PAYLOAD`] so the stream keeps flowing.
//!
//! A failing sink is retried with capped exponential backoff until it accepts
//! the result. Meanwhile the bounded result channel fills up and the shards
//! block on it. Delivery stops only when the sink reports itself closed, the
//! emitter is cancelled, or an explicit `max_retries` budget runs out.

use super::serializer::{JsonSerializer, MessageSerializer, FALLBACK_PAYLOAD};
use super::ResultSink;
use crate::config::EmitterConfig;
use crate::error::{SinkError, SinkResult};
use crate::metrics::EngineMetrics;
use cpu_p95_types::PercentileResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters reported by the emitter when it stops
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterStats {
    pub results_emitted: u64,
    pub serialization_failures: u64,
    pub retries: u64,
}

/// Serializes results and hands them to a [`ResultSink`]
pub struct ResultEmitter {
    sink: Arc<dyn ResultSink>,
    serializer: Arc<dyn MessageSerializer<PercentileResult>>,
    config: EmitterConfig,
    metrics: Arc<EngineMetrics>,
    cancel: CancellationToken,
    stats: EmitterStats,
}

impl ResultEmitter {
    pub fn new(sink: Arc<dyn ResultSink>, config: EmitterConfig) -> Self {
        Self {
            sink,
            serializer: Arc::new(JsonSerializer),
            config,
            metrics: Arc::new(EngineMetrics::new()),
            cancel: CancellationToken::new(),
            stats: EmitterStats::default(),
        }
    }

    pub fn with_serializer(
        mut self,
        serializer: Arc<dyn MessageSerializer<PercentileResult>>,
    ) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Token that abandons a delivery stuck in retries
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stats(&self) -> &EmitterStats {
        &self.stats
    }

    /// Serialize a result, falling back to an empty object on failure
    pub async fn encode(&mut self, result: &PercentileResult) -> Vec<u8> {
        match self.serializer.serialize(result).await {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    error = %e,
                    result_id = %result.id,
                    device_id = %result.device_id,
                    "Failed to serialize result, emitting fallback payload"
                );
                self.stats.serialization_failures += 1;
                self.metrics.serialization_failures.inc();
                FALLBACK_PAYLOAD.to_vec()
            }
        }
    }

    /// Serialize and deliver one result
    pub async fn emit(&mut self, result: &PercentileResult) -> SinkResult<()> {
        let payload = self.encode(result).await;
        self.send_with_retry(&result.device_id, &payload).await?;

        info!(
            device_id = %result.device_id,
            percentile95 = result.percentile95,
            window_start = result.window_start,
            window_end = result.window_end,
            "Emitted p95 result"
        );
        self.stats.results_emitted += 1;
        self.metrics.results_emitted.inc();
        Ok(())
    }

    async fn send_with_retry(&mut self, key: &str, payload: &[u8]) -> SinkResult<()> {
        let mut retries: u32 = 0;
        loop {
            let err = match self.sink.send(key, payload).await {
                Ok(()) => return Ok(()),
                Err(SinkError::Closed) => return Err(SinkError::Closed),
                Err(err) => err,
            };

            if self.config.max_retries.is_some_and(|max| retries >= max) {
                return Err(SinkError::Exhausted {
                    attempts: retries.saturating_add(1),
                    last_error: err.to_string(),
                });
            }

            let backoff = self.config.backoff(retries);
            retries = retries.saturating_add(1);
            self.stats.retries += 1;
            self.metrics.sink_retries.inc();
            warn!(
                sink = self.sink.name(),
                attempt = retries,
                error = %err,
                "Send failed, retrying in {:?}",
                backoff
            );

            tokio::select! {
                _ = sleep(backoff) => {}
                _ = self.cancel.cancelled() => {
                    return Err(SinkError::Cancelled { attempts: retries });
                }
            }
        }
    }

    /// Emit every result received until the channel closes, then flush
    pub async fn run(mut self, mut results: mpsc::Receiver<PercentileResult>) -> SinkResult<EmitterStats> {
        info!(sink = self.sink.name(), "Result emitter started");

        while let Some(result) = results.recv().await {
            if let Err(e) = self.emit(&result).await {
                error!(
                    sink = self.sink.name(),
                    error = %e,
                    "Result sink failed, stopping emitter"
                );
                return Err(e);
            }
        }

        debug!("Result channel closed, flushing sink");
        self.sink.flush().await?;
        info!(
            results_emitted = self.stats.results_emitted,
            "Result emitter stopped"
        );
        Ok(self.stats)
    }
}
