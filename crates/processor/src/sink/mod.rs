//! Output ports of the engine
//!
//! Finalized results leave the engine through a [`ResultSink`] as serialized
//! payloads keyed by device id. Samples rejected as late leave through a
//! [`LateDataSink`], which exists for observability only.

pub mod emitter;
pub mod late;
pub mod memory;
pub mod serializer;

pub use emitter::{EmitterStats, ResultEmitter};
pub use late::{CollectingLateSink, LoggingLateSink};
pub use memory::MemorySink;
pub use serializer::{JsonSerializer, MessageSerializer, FALLBACK_PAYLOAD};

use crate::error::SinkResult;
use async_trait::async_trait;
use cpu_p95_types::LateSample;

/// Destination for serialized results
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Deliver one payload
    async fn send(&self, key: &str, payload: &[u8]) -> SinkResult<()>;

    /// Flush buffered payloads
    async fn flush(&self) -> SinkResult<()> {
        Ok(())
    }

    /// Human readable sink name for logs
    fn name(&self) -> &str;
}

/// Side output for samples that arrived after all their windows fired
#[async_trait]
pub trait LateDataSink: Send + Sync {
    async fn on_late(&self, sample: LateSample) -> SinkResult<()>;
}
