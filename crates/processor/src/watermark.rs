//! Event-time watermark tracking
//!
//! A watermark asserts that no sample older than its timestamp is still
//! expected. The engine keeps one watermark per input partition, derived from
//! the highest event time that partition has produced minus a fixed
//! out-of-orderness bound, and combines them into a global watermark.
//!
//! # Overview
//!
//! - Per-partition watermarks never decrease
//! - Partitions that stay silent for the idle timeout (processing time) are
//!   excluded from the global watermark
//! - The global watermark is the minimum over active partitions and never
//!   decreases either; when every partition is idle it holds
//!
//! # Example
//!
//! ```rust
//! use processor::watermark::{BoundedOutOfOrdernessWatermark, WatermarkGenerator};
//! use std::time::Duration;
//!
//! let mut generator = BoundedOutOfOrdernessWatermark::new(
//!     Duration::from_secs(35),
//!     Duration::from_secs(10),
//! );
//!
//! let advanced = generator.on_event(100_000, 0);
//! assert_eq!(advanced.map(|wm| wm.timestamp), Some(65_000));
//! ```

use crate::clock::{SharedClock, SystemClock};
use crate::config::WatermarkConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Represents a watermark timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Watermark {
    /// The watermark timestamp in milliseconds since epoch
    pub timestamp: i64,
}

impl Watermark {
    /// Creates a new watermark with the given timestamp
    pub fn new(timestamp: i64) -> Self {
        Self { timestamp }
    }

    /// Creates a watermark from a DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            timestamp: dt.timestamp_millis(),
        }
    }

    /// Converts the watermark to a DateTime, if representable
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Returns the minimum possible watermark (beginning of time)
    pub fn min() -> Self {
        Self { timestamp: i64::MIN }
    }

    /// Returns the maximum possible watermark (end of time)
    pub fn max() -> Self {
        Self { timestamp: i64::MAX }
    }

    /// Checks if this watermark is before the given timestamp
    pub fn is_before(&self, timestamp: i64) -> bool {
        self.timestamp < timestamp
    }

    /// Checks if this watermark has reached the given timestamp
    pub fn has_reached(&self, timestamp: i64) -> bool {
        self.timestamp >= timestamp
    }

    /// Returns true if this is the minimum watermark
    pub fn is_min(&self) -> bool {
        self.timestamp == i64::MIN
    }

    /// Returns true if this is the maximum watermark
    pub fn is_max(&self) -> bool {
        self.timestamp == i64::MAX
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::min()
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_min() {
            return write!(f, "Watermark(min)");
        }
        match self.to_datetime() {
            Some(dt) => write!(f, "Watermark({})", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            None => write!(f, "Watermark({}ms)", self.timestamp),
        }
    }
}

/// Trait for generating watermarks from event streams
pub trait WatermarkGenerator: Send + Sync {
    /// Called when a new event arrives
    ///
    /// Returns the new global watermark if it advanced.
    fn on_event(&mut self, timestamp: i64, partition: u32) -> Option<Watermark>;

    /// Called periodically to re-evaluate idleness
    ///
    /// Returns the new global watermark if it advanced.
    fn on_periodic_check(&mut self) -> Option<Watermark>;

    /// Gets the current global watermark without advancing it
    fn current_watermark(&self) -> Watermark;

    /// Resets the watermark generator to its initial state
    fn reset(&mut self);

    /// Gets the watermark for a specific partition
    fn partition_watermark(&self, partition: u32) -> Option<Watermark>;
}

#[derive(Debug, Clone, Copy)]
struct PartitionState {
    max_timestamp: i64,
    watermark: Watermark,
    last_activity: i64,
    idle: bool,
}

/// Bounded out-of-orderness watermark generator
///
/// Tracks the maximum timestamp per partition and derives each partition's
/// watermark by subtracting a fixed delay.
pub struct BoundedOutOfOrdernessWatermark {
    max_out_of_orderness_ms: i64,
    idle_timeout_ms: i64,
    partitions: HashMap<u32, PartitionState>,
    current_watermark: Watermark,
    clock: SharedClock,
}

impl BoundedOutOfOrdernessWatermark {
    /// Creates a new generator on the system clock
    ///
    /// # Arguments
    /// * `max_out_of_orderness` - Delay subtracted from the max observed event time
    /// * `idle_timeout` - Processing-time silence after which a partition is idle
    pub fn new(max_out_of_orderness: Duration, idle_timeout: Duration) -> Self {
        Self::with_clock(max_out_of_orderness, idle_timeout, Arc::new(SystemClock))
    }

    /// Creates a new generator on an explicit clock
    pub fn with_clock(
        max_out_of_orderness: Duration,
        idle_timeout: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            max_out_of_orderness_ms: duration_millis(max_out_of_orderness),
            idle_timeout_ms: duration_millis(idle_timeout),
            partitions: HashMap::new(),
            current_watermark: Watermark::min(),
            clock,
        }
    }

    /// Creates a generator from the watermark configuration
    pub fn from_config(config: &WatermarkConfig, clock: SharedClock) -> Self {
        Self::with_clock(config.max_out_of_orderness(), config.idle_timeout(), clock)
    }

    fn compute_watermark(&self, max_ts: i64) -> Watermark {
        Watermark::new(max_ts.saturating_sub(self.max_out_of_orderness_ms))
    }

    fn is_idle_at(&self, state: &PartitionState, now: i64) -> bool {
        now.saturating_sub(state.last_activity) >= self.idle_timeout_ms
    }

    /// Gets all active partitions (non-idle)
    pub fn active_partitions(&self) -> Vec<u32> {
        let now = self.clock.now_millis();
        let mut active: Vec<u32> = self
            .partitions
            .iter()
            .filter(|(_, state)| !self.is_idle_at(state, now))
            .map(|(partition, _)| *partition)
            .collect();
        active.sort_unstable();
        active
    }

    /// Gets all idle partitions
    pub fn idle_partitions(&self) -> Vec<u32> {
        let now = self.clock.now_millis();
        let mut idle: Vec<u32> = self
            .partitions
            .iter()
            .filter(|(_, state)| self.is_idle_at(state, now))
            .map(|(partition, _)| *partition)
            .collect();
        idle.sort_unstable();
        idle
    }

    /// Minimum watermark over active partitions, None when all are idle
    fn merge_partition_watermarks(&self, now: i64) -> Option<Watermark> {
        self.partitions
            .values()
            .filter(|state| !self.is_idle_at(state, now))
            .map(|state| state.watermark)
            .min()
    }

    fn try_advance(&mut self, now: i64) -> Option<Watermark> {
        let candidate = self.merge_partition_watermarks(now)?;
        if candidate > self.current_watermark {
            self.current_watermark = candidate;
            return Some(candidate);
        }
        None
    }

    /// Checks if an event is behind the current watermark
    pub fn is_late_event(&self, timestamp: i64) -> bool {
        timestamp < self.current_watermark.timestamp
    }

    /// How far behind the current watermark an event is, 0 if not late
    pub fn get_lateness(&self, timestamp: i64) -> i64 {
        if self.is_late_event(timestamp) {
            self.current_watermark.timestamp.saturating_sub(timestamp)
        } else {
            0
        }
    }
}

impl WatermarkGenerator for BoundedOutOfOrdernessWatermark {
    fn on_event(&mut self, timestamp: i64, partition: u32) -> Option<Watermark> {
        trace!(
            timestamp = timestamp,
            partition = partition,
            "Processing event for watermark"
        );

        let now = self.clock.now_millis();
        let candidate = self.compute_watermark(timestamp);

        let state = self.partitions.entry(partition).or_insert(PartitionState {
            max_timestamp: timestamp,
            watermark: candidate,
            last_activity: now,
            idle: false,
        });

        if state.idle {
            info!(partition = partition, "Partition resumed from idle");
            state.idle = false;
        }
        state.last_activity = now;
        if timestamp > state.max_timestamp {
            state.max_timestamp = timestamp;
        }
        if candidate > state.watermark {
            state.watermark = candidate;
        }

        let advanced = self.try_advance(now);
        if let Some(watermark) = advanced {
            debug!(watermark = %watermark, "Advanced watermark");
        }
        advanced
    }

    fn on_periodic_check(&mut self) -> Option<Watermark> {
        let now = self.clock.now_millis();
        let timeout = self.idle_timeout_ms;

        let mut newly_idle = Vec::new();
        for (partition, state) in self.partitions.iter_mut() {
            if !state.idle && now.saturating_sub(state.last_activity) >= timeout {
                state.idle = true;
                newly_idle.push(*partition);
            }
        }
        if !newly_idle.is_empty() {
            newly_idle.sort_unstable();
            warn!(partitions = ?newly_idle, "Detected idle partitions");
        }

        let advanced = self.try_advance(now);
        if let Some(watermark) = advanced {
            debug!(watermark = %watermark, "Periodic watermark update");
        }
        advanced
    }

    fn current_watermark(&self) -> Watermark {
        self.current_watermark
    }

    fn reset(&mut self) {
        self.partitions.clear();
        self.current_watermark = Watermark::min();
        debug!("Watermark generator reset");
    }

    fn partition_watermark(&self, partition: u32) -> Option<Watermark> {
        self.partitions.get(&partition).map(|state| state.watermark)
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
