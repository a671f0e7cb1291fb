//! Configuration types for the window engine
//!
//! All durations are expressed in milliseconds. Defaults reproduce the
//! production job: 30s windows sliding every 5s, 35s allowed lateness,
//! 35s out-of-orderness bound and a 10s idleness timeout.

use crate::error::{Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Window configuration
    #[serde(default)]
    pub window: WindowConfig,

    /// Watermark configuration
    #[serde(default)]
    pub watermark: WatermarkConfig,

    /// Result emitter configuration
    #[serde(default)]
    pub emitter: EmitterConfig,

    /// Number of shard workers
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Capacity of every bounded channel in the engine
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Initial capacity of a fresh accumulator's value buffer
    #[serde(default = "default_initial_accumulator_capacity")]
    pub initial_accumulator_capacity: usize,

    /// Finalize open windows on shutdown instead of discarding them
    #[serde(default)]
    pub flush_on_shutdown: bool,

    /// Durable window state switch, must stay false
    #[serde(default)]
    pub persistent_state_enabled: bool,

    /// How result ids are generated
    #[serde(default)]
    pub id_strategy: IdStrategy,

    /// Percentile estimator
    #[serde(default)]
    pub interpolation: Interpolation,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            watermark: WatermarkConfig::default(),
            emitter: EmitterConfig::default(),
            parallelism: default_parallelism(),
            channel_capacity: default_channel_capacity(),
            initial_accumulator_capacity: default_initial_accumulator_capacity(),
            flush_on_shutdown: false,
            persistent_state_enabled: false,
            id_strategy: IdStrategy::default(),
            interpolation: Interpolation::default(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.window.validate()?;
        self.watermark.validate()?;
        self.emitter.validate()?;

        if self.parallelism == 0 {
            return Err(invalid("parallelism", "must be greater than 0"));
        }

        if self.channel_capacity == 0 {
            return Err(invalid("channel_capacity", "must be greater than 0"));
        }

        if self.persistent_state_enabled {
            return Err(ValidationError::Unsupported {
                feature: "persistent window state",
            }
            .into());
        }

        Ok(())
    }
}

/// Sliding window configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window length in milliseconds
    #[serde(default = "default_window_size")]
    pub size_ms: u64,

    /// Slide interval in milliseconds
    #[serde(default = "default_window_slide")]
    pub slide_ms: u64,

    /// Alignment offset in milliseconds, in [0, slide)
    #[serde(default)]
    pub offset_ms: u64,

    /// Grace period after window end before the window fires
    #[serde(default = "default_allowed_lateness")]
    pub allowed_lateness_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size_ms: default_window_size(),
            slide_ms: default_window_slide(),
            offset_ms: 0,
            allowed_lateness_ms: default_allowed_lateness(),
        }
    }
}

impl WindowConfig {
    /// Create a sliding window configuration
    pub fn sliding(size_ms: u64, slide_ms: u64) -> Self {
        Self {
            size_ms,
            slide_ms,
            ..Default::default()
        }
    }

    /// Set allowed lateness
    pub fn with_allowed_lateness(mut self, lateness_ms: u64) -> Self {
        self.allowed_lateness_ms = lateness_ms;
        self
    }

    pub fn size(&self) -> Duration {
        Duration::from_millis(self.size_ms)
    }

    pub fn slide(&self) -> Duration {
        Duration::from_millis(self.slide_ms)
    }

    pub fn allowed_lateness(&self) -> Duration {
        Duration::from_millis(self.allowed_lateness_ms)
    }

    /// Validate the window configuration
    pub fn validate(&self) -> Result<()> {
        if self.size_ms == 0 {
            return Err(invalid("window.size_ms", "must be greater than 0"));
        }
        if self.slide_ms == 0 || self.slide_ms > self.size_ms {
            return Err(invalid(
                "window.slide_ms",
                format!(
                    "must be greater than 0 and at most window.size_ms ({})",
                    self.size_ms
                ),
            ));
        }
        if self.offset_ms >= self.slide_ms {
            return Err(invalid(
                "window.offset_ms",
                format!("must be less than window.slide_ms ({})", self.slide_ms),
            ));
        }
        for (field, value) in [
            ("window.size_ms", self.size_ms),
            ("window.allowed_lateness_ms", self.allowed_lateness_ms),
        ] {
            if i64::try_from(value).is_err() {
                return Err(invalid(field, "does not fit in a signed 64-bit timestamp"));
            }
        }
        Ok(())
    }
}

/// Watermark configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Bounded out-of-orderness subtracted from the max observed event time
    #[serde(default = "default_max_out_of_orderness")]
    pub max_out_of_orderness_ms: u64,

    /// Processing-time silence after which a partition is idle
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,

    /// How often the dispatcher re-evaluates idleness
    #[serde(default = "default_check_interval")]
    pub check_interval_ms: u64,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            max_out_of_orderness_ms: default_max_out_of_orderness(),
            idle_timeout_ms: default_idle_timeout(),
            check_interval_ms: default_check_interval(),
        }
    }
}

impl WatermarkConfig {
    pub fn max_out_of_orderness(&self) -> Duration {
        Duration::from_millis(self.max_out_of_orderness_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Validate the watermark configuration
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_ms == 0 {
            return Err(invalid("watermark.idle_timeout_ms", "must be greater than 0"));
        }
        if self.check_interval_ms == 0 {
            return Err(invalid(
                "watermark.check_interval_ms",
                "must be greater than 0",
            ));
        }
        if i64::try_from(self.max_out_of_orderness_ms).is_err() {
            return Err(invalid(
                "watermark.max_out_of_orderness_ms",
                "does not fit in a signed 64-bit timestamp",
            ));
        }
        Ok(())
    }
}

/// Result emitter retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Retries after the first failed delivery before giving up
    ///
    /// `None` blocks on the sink until it accepts the result or the engine
    /// is cancelled.
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Base delay for exponential backoff
    #[serde(default = "default_base_backoff")]
    pub base_backoff_ms: u64,

    /// Upper bound on a single backoff delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            base_backoff_ms: default_base_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl EmitterConfig {
    /// Exponential backoff delay for the given retry number
    pub fn backoff(&self, retry: u32) -> Duration {
        let backoff_ms = self
            .base_backoff_ms
            .saturating_mul(2u64.saturating_pow(retry.min(10)));
        Duration::from_millis(backoff_ms.min(self.max_backoff_ms))
    }

    /// Validate the emitter configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_backoff_ms < self.base_backoff_ms {
            return Err(invalid(
                "emitter.max_backoff_ms",
                "must be at least emitter.base_backoff_ms",
            ));
        }
        Ok(())
    }
}

/// Result id generation strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Fresh random UUID per result, not idempotent across restarts
    #[default]
    Random,
    /// Name-based UUID over the device and the nominal window start and end,
    /// so replays of a window reproduce its id
    Deterministic,
}

/// Percentile estimation method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Position p(n+1)/100 with clamping at both ends
    #[default]
    Legacy,
    /// Position p(n-1)/100, linear between neighbours
    R7,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> crate::error::ProcessorError {
    ValidationError::InvalidField {
        field,
        reason: reason.into(),
    }
    .into()
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_channel_capacity() -> usize {
    10_000
}

fn default_initial_accumulator_capacity() -> usize {
    1_000
}

fn default_window_size() -> u64 {
    30_000
}

fn default_window_slide() -> u64 {
    5_000
}

fn default_allowed_lateness() -> u64 {
    35_000
}

fn default_max_out_of_orderness() -> u64 {
    35_000
}

fn default_idle_timeout() -> u64 {
    10_000
}

fn default_check_interval() -> u64 {
    1_000
}

fn default_base_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    60_000
}
