//! Counters and gauges of the window engine
//!
//! A single [`EngineMetrics`] instance is created per engine and shared by the
//! dispatcher, the shard workers and the emitter. Nothing is global; the
//! metrics only show up on `/metrics` once registered into a
//! [`MetricsRegistry`].

use super::labels::{RejectLabels, RejectReason};
use super::registry::MetricsRegistry;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    pub samples_received: Counter,
    pub samples_accepted: Counter,
    pub samples_rejected: Family<RejectLabels, Counter>,
    pub samples_late: Counter,
    pub late_window_assignments: Counter,
    pub windows_created: Counter,
    pub windows_fired: Counter,
    pub windows_discarded: Counter,
    pub results_emitted: Counter,
    pub serialization_failures: Counter,
    pub sink_retries: Counter,
    pub shard_restarts: Counter,
    pub current_watermark: Gauge,
    pub open_windows: Gauge,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the metrics and register them under the `cpu_p95` prefix
    pub fn registered(registry: &MetricsRegistry) -> Arc<Self> {
        let metrics = Self::new();
        metrics.register(&mut registry.registry().write());
        Arc::new(metrics)
    }

    /// Register every metric into a prometheus registry
    pub fn register(&self, registry: &mut Registry) {
        let registry = registry.sub_registry_with_prefix("cpu_p95");

        registry.register(
            "samples_received",
            "Samples handed to the engine",
            self.samples_received.clone(),
        );
        registry.register(
            "samples_accepted",
            "Samples that passed validation and were dispatched",
            self.samples_accepted.clone(),
        );
        registry.register(
            "samples_rejected",
            "Samples dropped before window assignment",
            self.samples_rejected.clone(),
        );
        registry.register(
            "samples_late",
            "Samples whose every window had already fired",
            self.samples_late.clone(),
        );
        registry.register(
            "late_window_assignments",
            "Window assignments skipped because the window had already fired",
            self.late_window_assignments.clone(),
        );
        registry.register(
            "windows_created",
            "Window accumulators created",
            self.windows_created.clone(),
        );
        registry.register(
            "windows_fired",
            "Windows finalized into a result",
            self.windows_fired.clone(),
        );
        registry.register(
            "windows_discarded",
            "Open windows dropped on shutdown or shard restart",
            self.windows_discarded.clone(),
        );
        registry.register(
            "results_emitted",
            "Results delivered to the result sink",
            self.results_emitted.clone(),
        );
        registry.register(
            "serialization_failures",
            "Results replaced by the fallback payload",
            self.serialization_failures.clone(),
        );
        registry.register(
            "sink_retries",
            "Result deliveries retried after a sink failure",
            self.sink_retries.clone(),
        );
        registry.register(
            "shard_restarts",
            "Shard workers restarted after a fatal error",
            self.shard_restarts.clone(),
        );
        registry.register(
            "current_watermark_ms",
            "Global event-time watermark in milliseconds",
            self.current_watermark.clone(),
        );
        registry.register(
            "open_windows",
            "Window accumulators currently held in memory",
            self.open_windows.clone(),
        );
    }

    pub fn record_rejected(&self, reason: RejectReason) {
        self.samples_rejected
            .get_or_create(&RejectLabels::new(reason))
            .inc();
    }

    pub fn rejected(&self, reason: RejectReason) -> u64 {
        self.samples_rejected
            .get_or_create(&RejectLabels::new(reason))
            .get()
    }

    pub fn record_watermark(&self, watermark: i64) {
        self.current_watermark.set(watermark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_metrics_are_encoded() {
        let registry = MetricsRegistry::new();
        let metrics = EngineMetrics::registered(&registry);

        metrics.samples_received.inc();
        metrics.record_rejected(RejectReason::Malformed);
        metrics.record_watermark(65_000);

        let text = registry.encode().unwrap();
        assert!(text.contains("cpu_p95_samples_received_total 1"));
        assert!(text.contains("cpu_p95_samples_rejected_total{reason=\"Malformed\"} 1"));
        assert!(text.contains("cpu_p95_current_watermark_ms 65000"));
    }

    #[test]
    fn test_clones_share_values() {
        let metrics = EngineMetrics::new();
        let clone = metrics.clone();
        clone.windows_fired.inc_by(3);
        assert_eq!(metrics.windows_fired.get(), 3);
        assert_eq!(metrics.rejected(RejectReason::OutOfRange), 0);
    }
}
