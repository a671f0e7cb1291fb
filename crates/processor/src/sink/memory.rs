//! In-memory result store
//!
//! Behaves like the downstream persistence table: rows are unique on `id`
//! and a conflicting insert is a no-op. It also answers the read-side
//! queries (latest complete window, latest result per device, top N).
//! Used by tests and by the binary when no external sink is configured.

use super::ResultSink;
use crate::error::{SinkError, SinkResult};
use async_trait::async_trait;
use cpu_p95_types::PercentileResult;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<PercentileResult>,
    ids: HashSet<String>,
    raw: Vec<Vec<u8>>,
    rejected: u64,
}

impl Inner {
    fn insert(&mut self, result: PercentileResult) -> bool {
        if !self.ids.insert(result.id.clone()) {
            debug!(id = %result.id, "Duplicate result id ignored");
            return false;
        }
        self.rows.push(result);
        true
    }
}

/// Result sink that keeps every decoded result in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    inner: Mutex<Inner>,
    failures_pending: AtomicU32,
    flushes: AtomicU64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` sends fail with a delivery error
    pub fn fail_next(&self, count: u32) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Insert one result, returns false on an id conflict
    pub fn insert(&self, result: PercentileResult) -> bool {
        self.inner.lock().insert(result)
    }

    /// Insert a batch of results
    ///
    /// The batch is applied as a unit when every row is valid. Otherwise it
    /// falls back to inserting row by row, skipping invalid rows. Returns the
    /// number of rows inserted.
    pub fn insert_batch(&self, results: Vec<PercentileResult>) -> usize {
        let mut inner = self.inner.lock();

        if results.iter().all(is_valid_row) {
            return results
                .into_iter()
                .filter(|result| inner.insert(result.clone()))
                .count();
        }

        warn!(
            rows = results.len(),
            "Batch insert rejected, falling back to per-row insert"
        );
        let mut inserted = 0;
        for result in results {
            if !is_valid_row(&result) {
                warn!(id = %result.id, "Skipping invalid result row");
                inner.rejected += 1;
                continue;
            }
            if inner.insert(result) {
                inserted += 1;
            }
        }
        inserted
    }

    /// All stored results in insertion order
    pub fn results(&self) -> Vec<PercentileResult> {
        self.inner.lock().rows.clone()
    }

    /// Results of one device in insertion order
    pub fn results_for(&self, device_id: &str) -> Vec<PercentileResult> {
        self.inner
            .lock()
            .rows
            .iter()
            .filter(|r| r.device_id == device_id)
            .cloned()
            .collect()
    }

    /// Every payload received, decoded or not
    pub fn raw_payloads(&self) -> Vec<Vec<u8>> {
        self.inner.lock().raw.clone()
    }

    /// Payloads or rows that could not be stored
    pub fn rejected_payloads(&self) -> u64 {
        self.inner.lock().rejected
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Highest `windowEnd` stored, the most recent complete window
    pub fn latest_complete_window(&self) -> Option<i64> {
        self.inner.lock().rows.iter().map(|r| r.window_end).max()
    }

    /// Most recently computed result of a device
    pub fn latest_for_device(&self, device_id: &str) -> Option<PercentileResult> {
        self.inner
            .lock()
            .rows
            .iter()
            .filter(|r| r.device_id == device_id)
            .max_by_key(|r| r.computed_at)
            .cloned()
    }

    /// Devices with the highest p95 in the latest complete window
    ///
    /// Each device appears once, with its most recent result in that window.
    pub fn top_n(&self, n: usize) -> Vec<PercentileResult> {
        let inner = self.inner.lock();
        let Some(latest_end) = inner.rows.iter().map(|r| r.window_end).max() else {
            return Vec::new();
        };

        let mut per_device: HashMap<&str, &PercentileResult> = HashMap::new();
        for row in inner.rows.iter().filter(|r| r.window_end == latest_end) {
            per_device
                .entry(row.device_id.as_str())
                .and_modify(|current| {
                    if row.computed_at > current.computed_at {
                        *current = row;
                    }
                })
                .or_insert(row);
        }

        let mut ranked: Vec<PercentileResult> = per_device.into_values().cloned().collect();
        ranked.sort_by(|a, b| {
            b.percentile95
                .total_cmp(&a.percentile95)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        ranked.truncate(n);
        ranked
    }
}

fn is_valid_row(result: &PercentileResult) -> bool {
    !result.id.is_empty() && !result.device_id.is_empty() && result.percentile95.is_finite()
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn send(&self, _key: &str, payload: &[u8]) -> SinkResult<()> {
        let pending = self.failures_pending.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures_pending.store(pending - 1, Ordering::SeqCst);
            return Err(SinkError::Delivery {
                reason: "injected failure".to_string(),
            });
        }

        let mut inner = self.inner.lock();
        inner.raw.push(payload.to_vec());

        match serde_json::from_slice::<PercentileResult>(payload) {
            Ok(result) => {
                inner.insert(result);
            }
            Err(e) => {
                warn!(error = %e, "Discarding undecodable result payload");
                inner.rejected += 1;
            }
        }
        Ok(())
    }

    async fn flush(&self) -> SinkResult<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
