//! Stream executor running the sharded window engine
//!
//! The executor is the single dispatcher in front of the shard workers:
//! - validates inbound samples and counts rejections
//! - routes every sample to the shard owning its device
//! - tracks per-partition watermarks and broadcasts every advance to all shards
//! - drives idleness detection on a processing-time interval
//!
//! Finalized results flow from the shards into one [`ResultEmitter`] task and
//! late samples into one [`LateDataSink`] task.

use super::shard::{run_shard, ShardMessage, ShardStats, ShardWorker};
use crate::aggregation::CpuPercentileAggregate;
use crate::clock::{SharedClock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{ProcessorError, Result, SinkResult};
use crate::io::SampleSource;
use crate::metrics::{EngineMetrics, RejectReason};
use crate::sink::{
    EmitterStats, JsonSerializer, LateDataSink, LoggingLateSink, MessageSerializer,
    ResultEmitter, ResultSink,
};
use crate::watermark::{BoundedOutOfOrdernessWatermark, Watermark, WatermarkGenerator};
use crate::window::SlidingWindowAssigner;
use cpu_p95_types::{CpuSample, LateSample, PercentileResult, TypesError};
use fxhash::FxHasher;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Statistics for the stream executor
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Samples handed to the executor, valid or not
    pub samples_received: u64,

    /// Samples dropped by validation
    pub samples_rejected: u64,

    /// Samples dispatched to a shard
    pub samples_accepted: u64,

    /// Samples routed to the late channel
    pub late_samples: u64,

    /// Windows a sample skipped because they had already fired
    pub late_window_assignments: u64,

    /// Samples whose windows could not be computed
    pub unassignable_samples: u64,

    pub windows_created: u64,
    pub windows_fired: u64,
    pub windows_discarded: u64,
    pub shard_restarts: u64,

    pub results_emitted: u64,
    pub serialization_failures: u64,
    pub sink_retries: u64,

    /// Last global watermark in milliseconds
    pub current_watermark: i64,
}

impl ExecutorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the counters of one shard in
    pub fn absorb_shard(&mut self, shard: &ShardStats) {
        self.late_samples += shard.late_samples;
        self.late_window_assignments += shard.late_window_assignments;
        self.unassignable_samples += shard.unassignable_samples;
        self.windows_created += shard.windows_created;
        self.windows_fired += shard.windows_fired;
        self.windows_discarded += shard.windows_discarded;
        self.shard_restarts += shard.restarts;
    }

    pub fn absorb_emitter(&mut self, emitter: &EmitterStats) {
        self.results_emitted += emitter.results_emitted;
        self.serialization_failures += emitter.serialization_failures;
        self.sink_retries += emitter.retries;
    }

    /// Get samples per second
    pub fn samples_per_second(&self, elapsed_seconds: f64) -> f64 {
        if elapsed_seconds > 0.0 {
            self.samples_received as f64 / elapsed_seconds
        } else {
            0.0
        }
    }
}

/// Builder for a running engine
///
/// # Example
///
/// ```rust,no_run
/// use processor::config::EngineConfig;
/// use processor::pipeline::StreamExecutor;
/// use processor::sink::MemorySink;
/// use cpu_p95_types::CpuSample;
/// use std::sync::Arc;
///
/// # async fn example() -> processor::error::Result<()> {
/// let sink = Arc::new(MemorySink::new());
/// let mut engine = StreamExecutor::new(EngineConfig::default(), sink.clone()).start()?;
///
/// engine.ingest(0, CpuSample::new("d1", 1_000, 42.0)).await?;
///
/// let stats = engine.shutdown().await?;
/// println!("{} results", stats.results_emitted);
/// # Ok(())
/// # }
/// ```
pub struct StreamExecutor {
    config: EngineConfig,
    sink: Arc<dyn ResultSink>,
    late_sink: Arc<dyn LateDataSink>,
    serializer: Arc<dyn MessageSerializer<PercentileResult>>,
    clock: SharedClock,
    metrics: Arc<EngineMetrics>,
    ready: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl StreamExecutor {
    pub fn new(config: EngineConfig, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            config,
            sink,
            late_sink: Arc::new(LoggingLateSink),
            serializer: Arc::new(JsonSerializer),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(EngineMetrics::new()),
            ready: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_late_sink(mut self, late_sink: Arc<dyn LateDataSink>) -> Self {
        self.late_sink = late_sink;
        self
    }

    pub fn with_serializer(
        mut self,
        serializer: Arc<dyn MessageSerializer<PercentileResult>>,
    ) -> Self {
        self.serializer = serializer;
        self
    }

    /// Clock used for idleness detection and `lastUpdated`
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Flag set while the engine accepts samples
    pub fn with_readiness(mut self, ready: Arc<AtomicBool>) -> Self {
        self.ready = ready;
        self
    }

    /// Token that abandons result deliveries stuck on an unavailable sink
    ///
    /// Without it the emitter retries until the sink accepts.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validate the configuration and spawn shard, emitter and late tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<RunningExecutor> {
        self.config.validate()?;

        let config = self.config;
        let capacity = config.channel_capacity;
        let (results_tx, results_rx) = mpsc::channel::<PercentileResult>(capacity);
        let (late_tx, late_rx) = mpsc::channel::<LateSample>(capacity);

        let mut shards = Vec::with_capacity(config.parallelism);
        let mut shard_handles = Vec::with_capacity(config.parallelism);
        for id in 0..config.parallelism {
            let assigner = SlidingWindowAssigner::from_config(&config.window)?;
            let aggregate = CpuPercentileAggregate::from_config(&config, Arc::clone(&self.clock));
            let worker = ShardWorker::new(
                id,
                assigner,
                aggregate,
                config.window.allowed_lateness(),
                Arc::clone(&self.metrics),
            );

            let (inbox_tx, inbox_rx) = mpsc::channel(capacity);
            shards.push(inbox_tx);
            shard_handles.push(tokio::spawn(run_shard(
                worker,
                inbox_rx,
                results_tx.clone(),
                late_tx.clone(),
                config.flush_on_shutdown,
            )));
        }
        drop(results_tx);
        drop(late_tx);

        let emitter = ResultEmitter::new(self.sink, config.emitter.clone())
            .with_serializer(self.serializer)
            .with_metrics(Arc::clone(&self.metrics))
            .with_cancellation(self.cancel);
        let emitter_handle = tokio::spawn(emitter.run(results_rx));
        let late_handle = tokio::spawn(run_late_sink(self.late_sink, late_rx));

        let watermarks =
            BoundedOutOfOrdernessWatermark::from_config(&config.watermark, self.clock);

        info!(
            parallelism = config.parallelism,
            window_size_ms = config.window.size_ms,
            window_slide_ms = config.window.slide_ms,
            allowed_lateness_ms = config.window.allowed_lateness_ms,
            "Stream executor started"
        );
        self.ready.store(true, Ordering::SeqCst);

        Ok(RunningExecutor {
            config,
            shards,
            shard_handles,
            emitter_handle,
            late_handle,
            watermarks,
            metrics: self.metrics,
            ready: self.ready,
            stats: ExecutorStats::new(),
        })
    }
}

/// Handle to a started engine
pub struct RunningExecutor {
    config: EngineConfig,
    shards: Vec<mpsc::Sender<ShardMessage>>,
    shard_handles: Vec<JoinHandle<ShardStats>>,
    emitter_handle: JoinHandle<SinkResult<EmitterStats>>,
    late_handle: JoinHandle<u64>,
    watermarks: BoundedOutOfOrdernessWatermark,
    metrics: Arc<EngineMetrics>,
    ready: Arc<AtomicBool>,
    stats: ExecutorStats,
}

impl RunningExecutor {
    /// Ingest a decoded sample read from `partition`
    pub async fn ingest(&mut self, partition: u32, sample: CpuSample) -> Result<()> {
        self.stats.samples_received += 1;
        self.metrics.samples_received.inc();
        self.dispatch(partition, sample).await
    }

    /// Ingest a raw JSON payload read from `partition`
    ///
    /// Undecodable payloads are counted and dropped.
    pub async fn ingest_raw(&mut self, partition: u32, payload: &[u8]) -> Result<()> {
        self.stats.samples_received += 1;
        self.metrics.samples_received.inc();

        match CpuSample::from_json(payload) {
            Ok(sample) => self.dispatch(partition, sample).await,
            Err(e) => {
                self.reject(RejectReason::Malformed, &e);
                Ok(())
            }
        }
    }

    async fn dispatch(&mut self, partition: u32, sample: CpuSample) -> Result<()> {
        if let Err(e) = sample.validate() {
            self.reject(RejectReason::from(&e), &TypesError::Invalid(e));
            return Ok(());
        }

        let event_time = sample.event_time;
        let shard = shard_for(&sample.device_id, self.shards.len());
        trace!(
            device_id = %sample.device_id,
            partition = partition,
            shard = shard,
            "Dispatching sample"
        );
        self.send_to(shard, ShardMessage::Sample(sample)).await?;
        self.stats.samples_accepted += 1;
        self.metrics.samples_accepted.inc();

        if let Some(watermark) = self.watermarks.on_event(event_time, partition) {
            self.broadcast(watermark).await?;
        }
        Ok(())
    }

    fn reject(&mut self, reason: RejectReason, error: &TypesError) {
        self.stats.samples_rejected += 1;
        self.metrics.record_rejected(reason);
        warn!(reason = %reason, error = %error, "Rejecting sample");
    }

    /// Run the idleness check, advancing the watermark if it moved
    pub async fn tick(&mut self) -> Result<()> {
        if let Some(watermark) = self.watermarks.on_periodic_check() {
            debug!(watermark = %watermark, "Periodic watermark update");
            self.broadcast(watermark).await?;
        }
        Ok(())
    }

    async fn broadcast(&mut self, watermark: Watermark) -> Result<()> {
        self.stats.current_watermark = watermark.timestamp;
        self.metrics.record_watermark(watermark.timestamp);
        for shard in 0..self.shards.len() {
            self.send_to(shard, ShardMessage::Watermark(watermark)).await?;
        }
        Ok(())
    }

    async fn send_to(&self, shard: usize, message: ShardMessage) -> Result<()> {
        self.shards[shard]
            .send(message)
            .await
            .map_err(|_| ProcessorError::Execution {
                source: format!("Shard {} is no longer running", shard).into(),
            })
    }

    /// Current global watermark
    pub fn current_watermark(&self) -> Watermark {
        self.watermarks.current_watermark()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Pull records from `source` until it is exhausted or `shutdown` fires
    ///
    /// Idleness is checked every `check_interval_ms` while waiting.
    pub async fn run_source<S>(&mut self, source: &mut S, shutdown: CancellationToken) -> Result<()>
    where
        S: SampleSource + ?Sized,
    {
        info!(source = source.name(), "Reading samples");
        let mut ticker = time::interval(self.config.watermark.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(source = source.name(), "Shutdown requested, stopping source");
                    break;
                }
                _ = ticker.tick() => self.tick().await?,
                record = source.next_record() => match record? {
                    Some(record) => self.ingest_raw(record.partition, &record.payload).await?,
                    None => {
                        info!(source = source.name(), "Source exhausted");
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    /// Stop accepting samples and wait for every task to drain
    ///
    /// Shards flush or discard their open windows depending on
    /// `flush_on_shutdown`. A sink that gave up surfaces here as an error.
    pub async fn shutdown(self) -> Result<ExecutorStats> {
        let RunningExecutor {
            shards,
            shard_handles,
            emitter_handle,
            late_handle,
            ready,
            mut stats,
            ..
        } = self;

        ready.store(false, Ordering::SeqCst);
        info!("Stopping stream executor");
        drop(shards);

        for handle in shard_handles {
            let shard_stats = handle.await.map_err(|e| ProcessorError::Execution {
                source: Box::new(e),
            })?;
            stats.absorb_shard(&shard_stats);
        }

        let emitter_stats = emitter_handle
            .await
            .map_err(|e| ProcessorError::Execution {
                source: Box::new(e),
            })??;
        stats.absorb_emitter(&emitter_stats);

        let late = late_handle.await.map_err(|e| ProcessorError::Execution {
            source: Box::new(e),
        })?;
        debug!(late_samples = late, "Late channel drained");

        info!(
            samples_received = stats.samples_received,
            samples_rejected = stats.samples_rejected,
            windows_fired = stats.windows_fired,
            results_emitted = stats.results_emitted,
            "Stream executor stopped"
        );
        Ok(stats)
    }
}

async fn run_late_sink(sink: Arc<dyn LateDataSink>, mut late: mpsc::Receiver<LateSample>) -> u64 {
    let mut count = 0;
    while let Some(sample) = late.recv().await {
        count += 1;
        if let Err(e) = sink.on_late(sample).await {
            error!(error = %e, "Late data sink failed");
        }
    }
    count
}

/// Shard owning a device: `hash(device_id) % shards`
///
/// `FxHasher` is unseeded, so a device maps to the same shard across runs.
pub fn shard_for(device_id: &str, shards: usize) -> usize {
    let mut hasher = FxHasher::default();
    device_id.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}
