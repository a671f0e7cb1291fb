//! Outbound percentile results and late-data records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device id carried by the sentinel result of an empty accumulator
pub const UNKNOWN_DEVICE: &str = "unknown";

/// The 95th-percentile CPU usage of one device over one window firing
///
/// `window_start` and `window_end` are the lowest and highest sample event
/// times folded into the window, not the nominal window boundaries.
/// Serialized as `{id, deviceId, windowStart, windowEnd, percentile95, lastUpdated}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercentileResult {
    /// Unique result identifier
    pub id: String,
    /// Device the result belongs to
    pub device_id: String,
    /// Earliest observed sample time in the window (millis)
    pub window_start: i64,
    /// Latest observed sample time in the window (millis)
    pub window_end: i64,
    /// 95th percentile of the CPU usage values
    pub percentile95: f64,
    /// Wall-clock time of finalization (millis)
    #[serde(rename = "lastUpdated")]
    pub computed_at: i64,
}

impl PercentileResult {
    /// Build the placeholder result for an accumulator that saw no samples
    pub fn sentinel(id: String, now: i64) -> Self {
        Self {
            id,
            device_id: UNKNOWN_DEVICE.to_string(),
            window_start: now,
            window_end: now,
            percentile95: 0.0,
            computed_at: now,
        }
    }

    /// Whether this is the empty-accumulator placeholder
    pub fn is_sentinel(&self) -> bool {
        self.device_id == UNKNOWN_DEVICE && self.percentile95 == 0.0
    }

    /// Alias matching the wire name of `computed_at`
    pub fn last_updated(&self) -> i64 {
        self.computed_at
    }

    pub fn computed_at_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.computed_at)
    }
}

impl fmt::Display for PercentileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PercentileResult {{ id: {}, device: {}, window: {} - {}, p95: {:.2}, last_updated: {} }}",
            self.id,
            self.device_id,
            self.window_start,
            self.window_end,
            self.percentile95,
            self.computed_at
        )
    }
}

/// A sample that arrived after every window it belonged to had fired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LateSample {
    pub device_id: String,
    pub event_time: i64,
    /// Watermark of the shard when the sample was rejected
    pub watermark: i64,
}

impl fmt::Display for LateSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Late event: {} at {}", self.device_id, self.event_time)
    }
}
