//! Inbound CPU utilization samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SampleError};

/// A single CPU utilization reading for one device
///
/// The JSON shape is `{"deviceId": "...", "timestamp": <millis>, "cpuUsage": <percent>}`.
/// `event_time` is the time the reading was taken on the device, in
/// milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSample {
    /// Device identifier, also the partitioning key
    pub device_id: String,
    /// Event time in milliseconds since epoch
    #[serde(rename = "timestamp")]
    pub event_time: i64,
    /// CPU usage in percent
    pub cpu_usage: f64,
}

impl CpuSample {
    /// Create a new sample
    pub fn new(device_id: impl Into<String>, event_time: i64, cpu_usage: f64) -> Self {
        Self {
            device_id: device_id.into(),
            event_time,
            cpu_usage,
        }
    }

    /// Decode a sample from a JSON payload without validating it
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Decode and validate a sample in one step
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let sample = Self::from_json(payload)?;
        sample.validate()?;
        Ok(sample)
    }

    /// Check the sample against the data model
    pub fn validate(&self) -> std::result::Result<(), SampleError> {
        if self.device_id.trim().is_empty() {
            return Err(SampleError::EmptyDeviceId);
        }
        if !self.cpu_usage.is_finite() {
            return Err(SampleError::NonFiniteUsage {
                value: self.cpu_usage,
            });
        }
        if !(0.0..=100.0).contains(&self.cpu_usage) {
            return Err(SampleError::UsageOutOfRange {
                value: self.cpu_usage,
            });
        }
        Ok(())
    }

    /// Event time as a UTC datetime, if representable
    pub fn event_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.event_time)
    }
}
