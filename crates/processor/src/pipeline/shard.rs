//! Shard workers
//!
//! A shard owns the window state of every device hashed to it. It receives
//! samples and watermark advances over one ordered channel, so the order in
//! which it sees them is the order in which the dispatcher sent them.
//!
//! Window lifecycle per (device, window):
//! - open: created by the first sample, accepts further samples
//! - firing-eligible: `window_end + allowed_lateness <= watermark`
//! - fired: finalized into a result and removed from the store

use crate::aggregation::{AggregateFunction, CpuAccumulator, CpuPercentileAggregate};
use crate::error::{ProcessorError, Result, WatermarkError};
use crate::metrics::EngineMetrics;
use crate::state::WindowStateStore;
use crate::watermark::Watermark;
use crate::window::{SlidingWindowAssigner, WindowAssigner, WindowInstance};
use cpu_p95_types::{CpuSample, LateSample, PercentileResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Message delivered to a shard
#[derive(Debug, Clone, PartialEq)]
pub enum ShardMessage {
    Sample(CpuSample),
    Watermark(Watermark),
}

/// What happened to a sample handed to a shard
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Folded into at least one window
    Accepted {
        windows: usize,
        late_windows: usize,
    },
    /// Every window of the sample had already fired
    Late(LateSample),
}

/// Counters kept by one shard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStats {
    pub samples: u64,
    pub late_samples: u64,
    pub late_window_assignments: u64,
    pub unassignable_samples: u64,
    pub windows_created: u64,
    pub windows_fired: u64,
    pub windows_discarded: u64,
    pub restarts: u64,
}

/// Synchronous core of a shard: window state plus firing policy
pub struct ShardWorker {
    id: usize,
    assigner: SlidingWindowAssigner,
    aggregate: CpuPercentileAggregate,
    store: WindowStateStore<CpuAccumulator>,
    allowed_lateness: i64,
    watermark: Watermark,
    metrics: Arc<EngineMetrics>,
    stats: ShardStats,
}

impl ShardWorker {
    pub fn new(
        id: usize,
        assigner: SlidingWindowAssigner,
        aggregate: CpuPercentileAggregate,
        allowed_lateness: Duration,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let window_size = assigner.size_millis();
        Self {
            id,
            assigner,
            aggregate,
            store: WindowStateStore::new(window_size),
            allowed_lateness: i64::try_from(allowed_lateness.as_millis()).unwrap_or(i64::MAX),
            watermark: Watermark::min(),
            metrics,
            stats: ShardStats::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub fn stats(&self) -> &ShardStats {
        &self.stats
    }

    pub fn open_windows(&self) -> usize {
        self.store.open_windows()
    }

    /// Event time at which a window becomes eligible to fire
    fn firing_time(&self, window: &WindowInstance) -> Result<i64> {
        window
            .end()
            .checked_add(self.allowed_lateness)
            .ok_or_else(|| {
                WatermarkError::TimerOverflow {
                    operation: "firing time",
                    window_start: window.start(),
                }
                .into()
            })
    }

    /// Fold a sample into every window of it that has not fired yet
    pub fn on_sample(&mut self, sample: &CpuSample) -> Result<SampleOutcome> {
        let windows = self.assigner.assign(sample)?;
        let firing_times = windows
            .iter()
            .map(|window| self.firing_time(window))
            .collect::<Result<Vec<_>>>()?;
        self.stats.samples += 1;

        let mut accepted = 0;
        let mut late_windows = 0;
        for (window, firing_time) in windows.iter().zip(firing_times) {
            if self.watermark.has_reached(firing_time) {
                late_windows += 1;
                continue;
            }

            let (accumulator, created) = self
                .store
                .get_or_create(window, || self.aggregate.create_accumulator());
            self.aggregate.add(sample, accumulator);
            accepted += 1;

            if created {
                self.stats.windows_created += 1;
                self.metrics.windows_created.inc();
                self.metrics.open_windows.inc();
            }
        }

        if late_windows > 0 {
            self.stats.late_window_assignments += late_windows as u64;
            self.metrics.late_window_assignments.inc_by(late_windows as u64);
        }

        if accepted == 0 {
            self.stats.late_samples += 1;
            self.metrics.samples_late.inc();
            return Ok(SampleOutcome::Late(LateSample {
                device_id: sample.device_id.clone(),
                event_time: sample.event_time,
                watermark: self.watermark.timestamp,
            }));
        }

        trace!(
            shard = self.id,
            device_id = %sample.device_id,
            event_time = sample.event_time,
            windows = accepted,
            "Sample assigned"
        );
        Ok(SampleOutcome::Accepted {
            windows: accepted,
            late_windows,
        })
    }

    /// Advance the shard watermark and fire every window that became eligible
    ///
    /// Results are returned in ascending window start order.
    pub fn advance_watermark(&mut self, watermark: Watermark) -> Vec<PercentileResult> {
        if watermark <= self.watermark {
            return Vec::new();
        }
        self.watermark = watermark;

        // end + lateness <= wm  <=>  start <= wm - size - lateness
        let max_start = watermark
            .timestamp
            .checked_sub(self.assigner.size_millis())
            .and_then(|ts| ts.checked_sub(self.allowed_lateness));
        let Some(max_start) = max_start else {
            return Vec::new();
        };

        let due = self.store.drain_until(max_start);
        if due.is_empty() {
            return Vec::new();
        }

        debug!(
            shard = self.id,
            watermark = %watermark,
            windows = due.len(),
            "Firing windows"
        );
        self.stats.windows_fired += due.len() as u64;
        self.metrics.windows_fired.inc_by(due.len() as u64);
        self.metrics.open_windows.dec_by(due.len() as i64);
        self.finalize_all(due)
    }

    /// Finalize every open window regardless of the watermark
    pub fn flush(&mut self) -> Vec<PercentileResult> {
        let due = self.store.drain_all();
        if !due.is_empty() {
            info!(shard = self.id, windows = due.len(), "Flushing open windows");
        }
        self.stats.windows_fired += due.len() as u64;
        self.metrics.windows_fired.inc_by(due.len() as u64);
        self.metrics.open_windows.dec_by(due.len() as i64);
        self.finalize_all(due)
    }

    /// Drop every open window without emitting anything
    pub fn discard(&mut self) -> usize {
        let discarded = self.store.open_windows();
        self.store.clear();
        self.stats.windows_discarded += discarded as u64;
        self.metrics.windows_discarded.inc_by(discarded as u64);
        self.metrics.open_windows.dec_by(discarded as i64);
        discarded
    }

    /// Reset after a fatal error, keeping the watermark
    pub fn restart(&mut self) {
        let discarded = self.discard();
        self.stats.restarts += 1;
        self.metrics.shard_restarts.inc();
        warn!(
            shard = self.id,
            discarded_windows = discarded,
            "Shard state discarded, worker restarted"
        );
    }

    fn finalize_all(&self, due: Vec<(WindowInstance, CpuAccumulator)>) -> Vec<PercentileResult> {
        due.into_iter()
            .map(|(window, accumulator)| {
                trace!(shard = self.id, window = %window, "Finalizing window");
                self.aggregate.finalize(&window, accumulator)
            })
            .collect()
    }
}

/// Supervised shard loop
///
/// Processes messages until the inbox closes, then flushes or discards the
/// remaining windows. Samples that cannot be assigned or whose firing time
/// overflows are dropped and counted. Any other processing error discards the
/// shard's state and the loop continues on the same inbox. The loop ends early
/// only when the result channel is gone.
pub async fn run_shard(
    mut worker: ShardWorker,
    mut inbox: mpsc::Receiver<ShardMessage>,
    results: mpsc::Sender<PercentileResult>,
    late: mpsc::Sender<LateSample>,
    flush_on_shutdown: bool,
) -> ShardStats {
    let shard = worker.id();
    debug!(shard = shard, "Shard worker started");

    while let Some(message) = inbox.recv().await {
        let fired = match message {
            ShardMessage::Sample(sample) => match worker.on_sample(&sample) {
                Ok(SampleOutcome::Accepted { .. }) => Vec::new(),
                Ok(SampleOutcome::Late(late_sample)) => {
                    if late.send(late_sample).await.is_err() {
                        debug!(shard = shard, "Late channel closed, dropping late sample");
                    }
                    Vec::new()
                }
                Err(ProcessorError::Window(e)) => {
                    worker.stats.unassignable_samples += 1;
                    warn!(shard = shard, error = %e, "Dropping unassignable sample");
                    Vec::new()
                }
                // Detected before any window is touched, other keys are unaffected
                Err(ProcessorError::Watermark(e @ WatermarkError::TimerOverflow { .. })) => {
                    worker.stats.unassignable_samples += 1;
                    warn!(
                        shard = shard,
                        device_id = %sample.device_id,
                        event_time = sample.event_time,
                        error = %e,
                        "Dropping sample whose firing time overflows"
                    );
                    Vec::new()
                }
                Err(e) => {
                    error!(shard = shard, error = %e, "Shard failed");
                    worker.restart();
                    Vec::new()
                }
            },
            ShardMessage::Watermark(watermark) => worker.advance_watermark(watermark),
        };

        for result in fired {
            if results.send(result).await.is_err() {
                error!(shard = shard, "Result channel closed, stopping shard");
                worker.discard();
                return worker.stats;
            }
        }
    }

    let remaining = if flush_on_shutdown {
        worker.flush()
    } else {
        let discarded = worker.discard();
        if discarded > 0 {
            info!(shard = shard, windows = discarded, "Discarded open windows on shutdown");
        }
        Vec::new()
    };

    for result in remaining {
        if results.send(result).await.is_err() {
            error!(shard = shard, "Result channel closed during flush");
            break;
        }
    }

    debug!(shard = shard, "Shard worker stopped");
    worker.stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::Percentile;
    use crate::clock::ManualClock;
    use crate::config::IdStrategy;
    use crate::window::WindowBounds;

    const SECOND: i64 = 1_000;

    fn worker() -> ShardWorker {
        let assigner =
            SlidingWindowAssigner::new(Duration::from_secs(30), Duration::from_secs(5)).unwrap();
        let aggregate = CpuPercentileAggregate::new(
            Percentile::p95(),
            IdStrategy::Random,
            Arc::new(ManualClock::new(0)),
        );
        ShardWorker::new(
            0,
            assigner,
            aggregate,
            Duration::from_secs(35),
            Arc::new(EngineMetrics::new()),
        )
    }

    #[test]
    fn test_sample_opens_six_windows() {
        let mut worker = worker();
        let outcome = worker
            .on_sample(&CpuSample::new("d1", 12 * SECOND, 50.0))
            .unwrap();

        assert_eq!(
            outcome,
            SampleOutcome::Accepted {
                windows: 6,
                late_windows: 0
            }
        );
        assert_eq!(worker.open_windows(), 6);
    }

    #[test]
    fn test_window_fires_once_at_end_plus_lateness() {
        let mut worker = worker();
        worker.on_sample(&CpuSample::new("d1", 0, 60.0)).unwrap();
        worker.on_sample(&CpuSample::new("d1", 10 * SECOND, 75.5)).unwrap();
        worker.on_sample(&CpuSample::new("d1", 20 * SECOND, 90.0)).unwrap();

        let window = WindowInstance::new("d1", WindowBounds::new(0, 30 * SECOND));

        // Window [0, 30s) fires once the watermark reaches 65s
        worker.advance_watermark(Watermark::new(65 * SECOND - 1));
        assert!(worker.store.get(&window).is_some());

        let fired = worker.advance_watermark(Watermark::new(65 * SECOND));
        assert!(worker.store.get(&window).is_none());
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].device_id, "d1");
        assert_eq!(fired[0].percentile95, 90.0);
        assert_eq!(fired[0].window_start, 0);
        assert_eq!(fired[0].window_end, 20 * SECOND);

        // Nothing fires twice
        assert!(worker.advance_watermark(Watermark::new(65 * SECOND)).is_empty());
    }

    #[test]
    fn test_firing_order_is_ascending_by_start() {
        let mut worker = worker();
        worker.on_sample(&CpuSample::new("d1", 12 * SECOND, 50.0)).unwrap();

        let fired = worker.advance_watermark(Watermark::new(i64::MAX));
        assert_eq!(fired.len(), 6);
        assert_eq!(worker.open_windows(), 0);
        // Each result carries the observed bounds, all equal here
        assert!(fired.iter().all(|r| r.window_start == 12 * SECOND));
        assert_eq!(worker.stats().windows_fired, 6);
    }

    #[test]
    fn test_partially_late_sample() {
        let mut worker = worker();
        worker.advance_watermark(Watermark::new(70 * SECOND));

        // Windows of 12s start at -15s..10s; ends + 35s are 50s..75s.
        // Only [10s, 40s) fires after 70s.
        let outcome = worker
            .on_sample(&CpuSample::new("d1", 12 * SECOND, 50.0))
            .unwrap();
        assert_eq!(
            outcome,
            SampleOutcome::Accepted {
                windows: 1,
                late_windows: 5
            }
        );
        assert_eq!(worker.stats().late_window_assignments, 5);
    }

    #[test]
    fn test_fully_late_sample() {
        let mut worker = worker();
        worker.advance_watermark(Watermark::new(100 * SECOND));

        let outcome = worker
            .on_sample(&CpuSample::new("d1", 12 * SECOND, 50.0))
            .unwrap();
        assert_eq!(
            outcome,
            SampleOutcome::Late(LateSample {
                device_id: "d1".to_string(),
                event_time: 12 * SECOND,
                watermark: 100 * SECOND,
            })
        );
        assert_eq!(worker.open_windows(), 0);
    }

    #[test]
    fn test_watermark_never_regresses() {
        let mut worker = worker();
        worker.advance_watermark(Watermark::new(100 * SECOND));
        worker.advance_watermark(Watermark::new(50 * SECOND));
        assert_eq!(worker.watermark(), Watermark::new(100 * SECOND));
    }

    #[test]
    fn test_timer_overflow_is_fatal_error() {
        let mut worker = worker();
        let err = worker
            .on_sample(&CpuSample::new("d1", i64::MAX - 40 * SECOND, 1.0))
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::Watermark(WatermarkError::TimerOverflow { .. })
        ));
    }

    #[test]
    fn test_flush_and_discard() {
        let mut worker = worker();
        worker.on_sample(&CpuSample::new("d1", 0, 10.0)).unwrap();
        worker.on_sample(&CpuSample::new("d2", 0, 20.0)).unwrap();
        assert_eq!(worker.flush().len(), 12);

        worker.on_sample(&CpuSample::new("d1", 0, 10.0)).unwrap();
        assert_eq!(worker.discard(), 6);
        assert_eq!(worker.stats().windows_discarded, 6);
    }

    #[tokio::test]
    async fn test_run_shard_drops_overflowing_sample_only() {
        let (inbox_tx, inbox_rx) = mpsc::channel(16);
        let (results_tx, mut results_rx) = mpsc::channel(64);
        let (late_tx, _late_rx) = mpsc::channel(16);
        let handle = tokio::spawn(run_shard(worker(), inbox_rx, results_tx, late_tx, true));

        inbox_tx
            .send(ShardMessage::Sample(CpuSample::new("d2", 0, 20.0)))
            .await
            .unwrap();
        inbox_tx
            .send(ShardMessage::Sample(CpuSample::new(
                "d1",
                i64::MAX - 40 * SECOND,
                1.0,
            )))
            .await
            .unwrap();
        inbox_tx
            .send(ShardMessage::Sample(CpuSample::new("d3", 0, 30.0)))
            .await
            .unwrap();
        drop(inbox_tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.restarts, 0);
        assert_eq!(stats.unassignable_samples, 1);
        assert_eq!(stats.windows_discarded, 0);

        let mut devices = Vec::new();
        while let Some(result) = results_rx.recv().await {
            devices.push(result.device_id);
        }
        assert_eq!(devices.len(), 12);
        assert_eq!(devices.iter().filter(|d| *d == "d2").count(), 6);
        assert_eq!(devices.iter().filter(|d| *d == "d3").count(), 6);
    }

    #[test]
    fn test_restart_discards_state_and_keeps_watermark() {
        let mut worker = worker();
        worker.advance_watermark(Watermark::new(SECOND));
        worker.on_sample(&CpuSample::new("d1", 100 * SECOND, 10.0)).unwrap();

        worker.restart();
        assert_eq!(worker.open_windows(), 0);
        assert_eq!(worker.stats().restarts, 1);
        assert_eq!(worker.stats().windows_discarded, 6);
        assert_eq!(worker.watermark(), Watermark::new(SECOND));
    }

    #[tokio::test]
    async fn test_run_shard_routes_late_samples() {
        let (inbox_tx, inbox_rx) = mpsc::channel(16);
        let (results_tx, _results_rx) = mpsc::channel(64);
        let (late_tx, mut late_rx) = mpsc::channel(16);
        let handle = tokio::spawn(run_shard(worker(), inbox_rx, results_tx, late_tx, false));

        inbox_tx
            .send(ShardMessage::Watermark(Watermark::new(100 * SECOND)))
            .await
            .unwrap();
        inbox_tx
            .send(ShardMessage::Sample(CpuSample::new("d1", SECOND, 10.0)))
            .await
            .unwrap();
        drop(inbox_tx);

        handle.await.unwrap();
        let late = late_rx.recv().await.unwrap();
        assert_eq!(late.device_id, "d1");
        assert_eq!(late.event_time, SECOND);
    }
}
