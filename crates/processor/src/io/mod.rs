//! Source adapters and line-oriented sinks
//!
//! A [`SampleSource`] yields raw sample payloads tagged with the input
//! partition they came from; the partition drives per-partition watermarks.

pub mod ndjson;

pub use ndjson::{NdjsonSource, WriterSink};

use crate::error::Result;
use async_trait::async_trait;

/// One raw record from an input partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub partition: u32,
    pub payload: Vec<u8>,
}

impl SourceRecord {
    pub fn new(partition: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            partition,
            payload: payload.into(),
        }
    }
}

/// Ordered-within-partition stream of raw sample payloads
///
/// `next_record` must be cancel safe: the engine polls it inside
/// `tokio::select!` next to its idleness timer.
#[async_trait]
pub trait SampleSource: Send {
    /// Next record, `None` once the source is exhausted
    async fn next_record(&mut self) -> Result<Option<SourceRecord>>;

    fn name(&self) -> &str;
}
