//! CPU p95 aggregate
//!
//! The accumulator keeps every value of the window because an exact
//! percentile needs the full sample set. It also tracks the lowest and
//! highest sample event time, which become the `windowStart` and `windowEnd`
//! of the emitted result.

use super::percentile::Percentile;
use super::trait_::AggregateFunction;
use crate::clock::{SharedClock, SystemClock};
use crate::config::{EngineConfig, IdStrategy};
use crate::error::{AggregationError, AggregationResult};
use crate::window::WindowInstance;
use cpu_p95_types::{CpuSample, PercentileResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

/// Per-window state of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuAccumulator {
    device_id: Option<String>,
    observed_min: i64,
    observed_max: i64,
    values: Vec<f64>,
}

impl CpuAccumulator {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Empty accumulator with a preallocated value buffer
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            device_id: None,
            observed_min: i64::MAX,
            observed_max: i64::MIN,
            values: Vec::with_capacity(capacity),
        }
    }

    /// Fold one sample in
    pub fn add(&mut self, sample: &CpuSample) {
        if self.device_id.is_none() {
            self.device_id = Some(sample.device_id.clone());
        }
        self.observed_min = self.observed_min.min(sample.event_time);
        self.observed_max = self.observed_max.max(sample.event_time);
        self.values.push(sample.cpu_usage);
    }

    /// Combine two accumulators
    ///
    /// An empty side yields the other side unchanged.
    pub fn merge(self, other: CpuAccumulator) -> AggregationResult<CpuAccumulator> {
        if self.is_empty() {
            return Ok(other);
        }
        if other.is_empty() {
            return Ok(self);
        }
        if self.device_id != other.device_id {
            return Err(AggregationError::KeyMismatch {
                left: self.device_id.unwrap_or_default(),
                right: other.device_id.unwrap_or_default(),
            });
        }

        let (mut base, extra) = if self.values.capacity() >= other.values.capacity() {
            (self, other)
        } else {
            (other, self)
        };
        base.observed_min = base.observed_min.min(extra.observed_min);
        base.observed_max = base.observed_max.max(extra.observed_max);
        base.values.extend(extra.values);
        Ok(base)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Lowest event time folded in, if any
    pub fn observed_min(&self) -> Option<i64> {
        (!self.is_empty()).then_some(self.observed_min)
    }

    /// Highest event time folded in, if any
    pub fn observed_max(&self) -> Option<i64> {
        (!self.is_empty()).then_some(self.observed_max)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl Default for CpuAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate turning CPU samples into a p95 result per window
#[derive(Debug, Clone)]
pub struct CpuPercentileAggregate {
    percentile: Percentile,
    id_strategy: IdStrategy,
    initial_capacity: usize,
    clock: SharedClock,
}

impl CpuPercentileAggregate {
    pub fn new(percentile: Percentile, id_strategy: IdStrategy, clock: SharedClock) -> Self {
        Self {
            percentile,
            id_strategy,
            initial_capacity: 0,
            clock,
        }
    }

    /// Build the aggregate from the engine configuration
    pub fn from_config(config: &EngineConfig, clock: SharedClock) -> Self {
        Self::new(
            Percentile::p95().with_interpolation(config.interpolation),
            config.id_strategy,
            clock,
        )
        .with_initial_capacity(config.initial_accumulator_capacity)
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn percentile(&self) -> &Percentile {
        &self.percentile
    }

    fn result_id(&self, window: &WindowInstance) -> String {
        match self.id_strategy {
            IdStrategy::Random => Uuid::new_v4().to_string(),
            IdStrategy::Deterministic => deterministic_result_id(window),
        }
    }
}

/// Name-based result id of a window, stable across runs
pub fn deterministic_result_id(window: &WindowInstance) -> String {
    let name = format!("{}:{}:{}", window.device_id, window.start(), window.end());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

impl Default for CpuPercentileAggregate {
    fn default() -> Self {
        Self::new(Percentile::p95(), IdStrategy::Random, Arc::new(SystemClock))
    }
}

impl AggregateFunction for CpuPercentileAggregate {
    type Input = CpuSample;
    type Accumulator = CpuAccumulator;
    type Output = PercentileResult;

    fn create_accumulator(&self) -> CpuAccumulator {
        CpuAccumulator::with_capacity(self.initial_capacity)
    }

    fn add(&self, value: &CpuSample, accumulator: &mut CpuAccumulator) {
        accumulator.add(value);
    }

    fn merge(
        &self,
        left: CpuAccumulator,
        right: CpuAccumulator,
    ) -> AggregationResult<CpuAccumulator> {
        left.merge(right)
    }

    fn finalize(&self, window: &WindowInstance, accumulator: CpuAccumulator) -> PercentileResult {
        let now = self.clock.now_millis();
        let id = self.result_id(window);

        let CpuAccumulator {
            device_id,
            observed_min,
            observed_max,
            mut values,
        } = accumulator;

        let device_id = match device_id {
            Some(device_id) if !values.is_empty() => device_id,
            _ => {
                trace!(window = %window, "Finalizing empty accumulator");
                return PercentileResult::sentinel(id, now);
            }
        };

        let percentile95 = self.percentile.evaluate_in_place(&mut values);

        PercentileResult {
            id,
            device_id,
            window_start: observed_min,
            window_end: observed_max,
            percentile95,
            computed_at: now,
        }
    }
}
