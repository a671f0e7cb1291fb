//! End-to-end tests for the sharded p95 engine
//!
//! Every test drives a real [`StreamExecutor`] with an in-memory sink and
//! inspects what reached the sink after a full shutdown.

use async_trait::async_trait;
use cpu_p95_types::{CpuSample, PercentileResult};
use processor::aggregation::deterministic_result_id;
use processor::clock::ManualClock;
use processor::config::{EngineConfig, IdStrategy};
use processor::error::Result;
use processor::io::NdjsonSource;
use processor::metrics::{EngineMetrics, RejectReason};
use processor::pipeline::StreamExecutor;
use processor::sink::{CollectingLateSink, MemorySink, MessageSerializer, FALLBACK_PAYLOAD};
use processor::watermark::Watermark;
use processor::window::{WindowBounds, WindowInstance};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SECOND: i64 = 1_000;

/// Aligned to the 5s slide
const T0: i64 = 1_700_000_000_000;

fn config() -> EngineConfig {
    EngineConfig {
        parallelism: 4,
        id_strategy: IdStrategy::Deterministic,
        ..EngineConfig::default()
    }
}

fn nominal_id(device_id: &str, start: i64) -> String {
    deterministic_result_id(&WindowInstance::new(
        device_id,
        WindowBounds::new(start, start + 30 * SECOND),
    ))
}

fn find(results: &[PercentileResult], id: &str) -> Vec<PercentileResult> {
    results.iter().filter(|r| r.id == id).cloned().collect()
}

#[tokio::test]
async fn test_three_samples_produce_golden_p95() {
    let sink = Arc::new(MemorySink::new());
    let mut engine = StreamExecutor::new(config(), sink.clone())
        .with_clock(Arc::new(ManualClock::new(T0)))
        .start()
        .unwrap();

    engine.ingest(0, CpuSample::new("d1", T0, 60.0)).await.unwrap();
    engine.ingest(0, CpuSample::new("d1", T0 + 10 * SECOND, 75.5)).await.unwrap();
    engine.ingest(0, CpuSample::new("d1", T0 + 20 * SECOND, 90.0)).await.unwrap();

    // Pushes the watermark to T0 + 65s, the firing time of [T0, T0 + 30s)
    engine.ingest(0, CpuSample::new("d2", T0 + 100 * SECOND, 1.0)).await.unwrap();
    assert_eq!(engine.current_watermark(), Watermark::new(T0 + 65 * SECOND));

    let stats = engine.shutdown().await.unwrap();
    let results = sink.results();

    let fired = find(&results, &nominal_id("d1", T0));
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].device_id, "d1");
    assert_eq!(fired[0].percentile95, 90.0);
    assert_eq!(fired[0].window_start, T0);
    assert_eq!(fired[0].window_end, T0 + 20 * SECOND);
    assert_eq!(fired[0].last_updated(), T0);

    // Six windows of d1 start at or before T0, none of d2 has fired
    assert_eq!(sink.results_for("d1").len(), 6);
    assert!(sink.results_for("d2").is_empty());
    assert_eq!(stats.windows_fired, 6);
    assert_eq!(stats.results_emitted, 6);
}

#[tokio::test]
async fn test_window_does_not_fire_before_lateness_expires() {
    let sink = Arc::new(MemorySink::new());
    let mut engine = StreamExecutor::new(config(), sink.clone()).start().unwrap();

    engine.ingest(0, CpuSample::new("d1", T0, 60.0)).await.unwrap();
    // Watermark T0 + 65s - 1ms: [T0, T0 + 30s) is one millisecond short
    engine
        .ingest(0, CpuSample::new("d2", T0 + 100 * SECOND - 1, 1.0))
        .await
        .unwrap();

    engine.shutdown().await.unwrap();
    assert!(find(&sink.results(), &nominal_id("d1", T0)).is_empty());
    // The five earlier windows were due
    assert_eq!(sink.results_for("d1").len(), 5);
}

#[tokio::test]
async fn test_devices_are_aggregated_independently() {
    let sink = Arc::new(MemorySink::new());
    let mut engine = StreamExecutor::new(config(), sink.clone()).start().unwrap();

    for i in 0..20 {
        engine
            .ingest(0, CpuSample::new("d1", T0 + i * SECOND, (i + 1) as f64))
            .await
            .unwrap();
        engine
            .ingest(0, CpuSample::new("d2", T0 + i * SECOND, 50.0))
            .await
            .unwrap();
    }
    engine
        .ingest(0, CpuSample::new("d3", T0 + 200 * SECOND, 0.0))
        .await
        .unwrap();

    engine.shutdown().await.unwrap();
    let results = sink.results();

    let d1 = find(&results, &nominal_id("d1", T0));
    assert_eq!(d1.len(), 1);
    // Legacy estimator over 1..=20: pos 19.95 interpolates 19 and 20
    assert!((d1[0].percentile95 - 19.95).abs() < 1e-9);

    let d2 = find(&results, &nominal_id("d2", T0));
    assert_eq!(d2.len(), 1);
    assert_eq!(d2[0].percentile95, 50.0);
}

#[tokio::test]
async fn test_sample_behind_all_windows_goes_to_late_channel() {
    let sink = Arc::new(MemorySink::new());
    let late = Arc::new(CollectingLateSink::new());
    let mut engine = StreamExecutor::new(config(), sink.clone())
        .with_late_sink(late.clone())
        .start()
        .unwrap();

    engine.ingest(0, CpuSample::new("d1", T0, 10.0)).await.unwrap();
    engine.ingest(0, CpuSample::new("d1", T0 + 200 * SECOND, 20.0)).await.unwrap();
    engine.ingest(0, CpuSample::new("d1", T0 + SECOND, 99.0)).await.unwrap();

    let stats = engine.shutdown().await.unwrap();

    assert_eq!(stats.late_samples, 1);
    let samples = late.samples();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].device_id, "d1");
    assert_eq!(samples[0].event_time, T0 + SECOND);
    assert_eq!(samples[0].watermark, T0 + 165 * SECOND);

    // The late value never reached a result
    assert!(sink.results().iter().all(|r| r.percentile95 == 10.0));
}

#[tokio::test]
async fn test_partially_late_sample_joins_open_windows() {
    let sink = Arc::new(MemorySink::new());
    let late = Arc::new(CollectingLateSink::new());
    let mut engine = StreamExecutor::new(config(), sink.clone())
        .with_late_sink(late.clone())
        .start()
        .unwrap();

    // Watermark T0 + 70s: windows starting at or before T0 + 5s have fired
    engine.ingest(0, CpuSample::new("d2", T0 + 105 * SECOND, 1.0)).await.unwrap();
    // Windows of T0 + 12s start at T0 - 15s ..= T0 + 10s, only the last is open
    engine.ingest(0, CpuSample::new("d1", T0 + 12 * SECOND, 42.0)).await.unwrap();
    engine.ingest(0, CpuSample::new("d2", T0 + 200 * SECOND, 1.0)).await.unwrap();

    let stats = engine.shutdown().await.unwrap();

    assert!(late.is_empty());
    assert_eq!(stats.late_window_assignments, 5);
    let fired = find(&sink.results(), &nominal_id("d1", T0 + 10 * SECOND));
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].percentile95, 42.0);
}

#[tokio::test]
async fn test_shutdown_flushes_open_windows_when_enabled() {
    let sink = Arc::new(MemorySink::new());
    let mut engine = StreamExecutor::new(
        EngineConfig {
            flush_on_shutdown: true,
            ..config()
        },
        sink.clone(),
    )
    .start()
    .unwrap();

    engine.ingest(0, CpuSample::new("d1", T0, 33.0)).await.unwrap();
    let stats = engine.shutdown().await.unwrap();

    assert_eq!(stats.windows_fired, 6);
    assert_eq!(stats.windows_discarded, 0);
    assert_eq!(sink.results_for("d1").len(), 6);
    assert!(sink.flush_count() >= 1);
}

#[tokio::test]
async fn test_shutdown_discards_open_windows_by_default() {
    let sink = Arc::new(MemorySink::new());
    let metrics = Arc::new(EngineMetrics::new());
    let mut engine = StreamExecutor::new(config(), sink.clone())
        .with_metrics(metrics.clone())
        .start()
        .unwrap();

    engine.ingest(0, CpuSample::new("d1", T0, 33.0)).await.unwrap();
    let stats = engine.shutdown().await.unwrap();

    assert_eq!(stats.windows_fired, 0);
    assert_eq!(stats.windows_discarded, 6);
    assert!(sink.is_empty());
    assert_eq!(metrics.open_windows.get(), 0);
}

#[tokio::test]
async fn test_overflowing_sample_leaves_other_devices_alone() {
    let sink = Arc::new(MemorySink::new());
    let mut engine = StreamExecutor::new(
        EngineConfig {
            parallelism: 1,
            flush_on_shutdown: true,
            ..config()
        },
        sink.clone(),
    )
    .start()
    .unwrap();

    engine.ingest(0, CpuSample::new("d2", T0, 20.0)).await.unwrap();
    // Its windows end so close to i64::MAX that end + lateness overflows
    engine
        .ingest(1, CpuSample::new("d1", i64::MAX - 40 * SECOND, 1.0))
        .await
        .unwrap();

    let stats = engine.shutdown().await.unwrap();
    assert_eq!(sink.results_for("d2").len(), 6);
    assert!(sink.results_for("d1").is_empty());
    assert_eq!(stats.unassignable_samples, 1);
    assert_eq!(stats.shard_restarts, 0);
    assert_eq!(stats.windows_discarded, 0);
}

#[tokio::test]
async fn test_idle_partition_stops_holding_back_the_watermark() {
    let clock = Arc::new(ManualClock::new(0));
    let sink = Arc::new(MemorySink::new());
    let mut engine = StreamExecutor::new(config(), sink.clone())
        .with_clock(clock.clone())
        .start()
        .unwrap();

    engine.ingest(1, CpuSample::new("d1", T0, 70.0)).await.unwrap();
    assert_eq!(engine.current_watermark(), Watermark::new(T0 - 35 * SECOND));

    clock.set(5 * SECOND);
    engine.ingest(0, CpuSample::new("d2", T0 + 100 * SECOND, 1.0)).await.unwrap();
    // Partition 1 still active and behind
    assert_eq!(engine.current_watermark(), Watermark::new(T0 - 35 * SECOND));

    clock.set(10 * SECOND);
    engine.tick().await.unwrap();
    assert_eq!(engine.current_watermark(), Watermark::new(T0 + 65 * SECOND));

    engine.shutdown().await.unwrap();
    assert_eq!(sink.results_for("d1").len(), 6);
}

#[tokio::test]
async fn test_ndjson_source_counts_rejected_lines() {
    let input = format!(
        "{}\n\nnot json\n{}\n{}\n{}\n",
        r#"{"deviceId":"d1","timestamp":1700000000000,"cpuUsage":60.0}"#,
        r#"{"deviceId":"","timestamp":1700000000000,"cpuUsage":60.0}"#,
        r#"{"deviceId":"d1","timestamp":1700000000000,"cpuUsage":101.5}"#,
        r#"{"deviceId":"d1","timestamp":1700000200000,"cpuUsage":5.0}"#,
    );
    let metrics = Arc::new(EngineMetrics::new());
    let sink = Arc::new(MemorySink::new());
    let mut engine = StreamExecutor::new(config(), sink.clone())
        .with_metrics(metrics.clone())
        .start()
        .unwrap();

    let mut source = NdjsonSource::new(input.as_bytes(), "inline");
    engine
        .run_source(&mut source, CancellationToken::new())
        .await
        .unwrap();
    let stats = engine.shutdown().await.unwrap();

    assert_eq!(stats.samples_received, 5);
    assert_eq!(stats.samples_rejected, 3);
    assert_eq!(stats.samples_accepted, 2);
    assert_eq!(metrics.rejected(RejectReason::Malformed), 1);
    assert_eq!(metrics.rejected(RejectReason::EmptyDeviceId), 1);
    assert_eq!(metrics.rejected(RejectReason::OutOfRange), 1);
    assert_eq!(sink.results_for("d1").len(), 6);
}

struct FailingSerializer;

#[async_trait]
impl MessageSerializer<PercentileResult> for FailingSerializer {
    async fn serialize(&self, _message: &PercentileResult) -> Result<Vec<u8>> {
        Err(processor::error::ProcessorError::Serialization(
            "unsupported".to_string(),
        ))
    }

    fn content_type(&self) -> &str {
        "application/json"
    }
}

#[tokio::test]
async fn test_serialization_failure_emits_empty_object() {
    let sink = Arc::new(MemorySink::new());
    let mut engine = StreamExecutor::new(
        EngineConfig {
            flush_on_shutdown: true,
            ..config()
        },
        sink.clone(),
    )
    .with_serializer(Arc::new(FailingSerializer))
    .start()
    .unwrap();

    engine.ingest(0, CpuSample::new("d1", T0, 1.0)).await.unwrap();
    let stats = engine.shutdown().await.unwrap();

    assert_eq!(stats.serialization_failures, 6);
    assert_eq!(stats.results_emitted, 6);
    let raw = sink.raw_payloads();
    assert_eq!(raw.len(), 6);
    assert!(raw.iter().all(|p| p.as_slice() == FALLBACK_PAYLOAD));
    assert_eq!(sink.rejected_payloads(), 6);
}

#[tokio::test]
async fn test_random_ids_are_unique_per_result() {
    let sink = Arc::new(MemorySink::new());
    let mut engine = StreamExecutor::new(
        EngineConfig {
            id_strategy: IdStrategy::Random,
            flush_on_shutdown: true,
            ..config()
        },
        sink.clone(),
    )
    .start()
    .unwrap();

    engine.ingest(0, CpuSample::new("d1", T0, 1.0)).await.unwrap();
    engine.shutdown().await.unwrap();

    let mut ids: Vec<String> = sink.results().into_iter().map(|r| r.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}
