//! Window types and bounds
//!
//! Bounds are kept as raw millisecond timestamps so that assignment and
//! timer arithmetic can be checked for overflow.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the time bounds of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowBounds {
    /// Start time of the window in millis (inclusive)
    pub start: i64,
    /// End time of the window in millis (exclusive)
    pub end: i64,
}

impl WindowBounds {
    /// Create new window bounds, `start` must be before `end`
    pub fn new(start: i64, end: i64) -> Self {
        debug_assert!(start < end, "Window start must be before end");
        Self { start, end }
    }

    /// Get the length of the window in millis
    pub fn duration_millis(&self) -> i64 {
        self.end - self.start
    }

    /// Check if a timestamp falls within this window
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Check if this window overlaps with another window
    pub fn overlaps(&self, other: &WindowBounds) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            DateTime::from_timestamp_millis(self.start),
            DateTime::from_timestamp_millis(self.end),
        ) {
            (Some(start), Some(end)) => write!(
                f,
                "[{} - {})",
                start.format("%Y-%m-%d %H:%M:%S%.3f"),
                end.format("%Y-%m-%d %H:%M:%S%.3f")
            ),
            _ => write!(f, "[{} - {})", self.start, self.end),
        }
    }
}

impl PartialOrd for WindowBounds {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WindowBounds {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
    }
}

/// One window of one device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowInstance {
    pub device_id: String,
    pub bounds: WindowBounds,
}

impl WindowInstance {
    pub fn new(device_id: impl Into<String>, bounds: WindowBounds) -> Self {
        Self {
            device_id: device_id.into(),
            bounds,
        }
    }

    pub fn start(&self) -> i64 {
        self.bounds.start
    }

    pub fn end(&self) -> i64 {
        self.bounds.end
    }
}

impl fmt::Display for WindowInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Window[{} {}]", self.device_id, self.bounds)
    }
}
