//! Error types for the window engine
//!
//! Each stage of the engine has its own error enum. `ProcessorError` wraps
//! them for callers that only care whether the pipeline as a whole failed.

use thiserror::Error;

/// Main processor error type
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// Window-related errors
    #[error("window error: {0}")]
    Window(#[from] WindowError),

    /// Aggregation-related errors
    #[error("aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    /// Watermark generation errors
    #[error("watermark error: {0}")]
    Watermark(#[from] WatermarkError),

    /// Result sink errors
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(#[from] ValidationError),

    /// Execution errors
    #[error("execution error: {source}")]
    Execution {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Kafka-related errors
    #[error("kafka error: {source}")]
    Kafka {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Window assignment errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    /// Window size is invalid
    #[error("invalid window size: {size}ms, must be greater than 0")]
    InvalidWindowSize { size: i64 },

    /// Slide size is invalid for sliding windows
    #[error("invalid slide size: {slide}ms, must be greater than 0 and less than or equal to window size {window}ms")]
    InvalidSlideSize { slide: i64, window: i64 },

    /// Offset is outside [0, slide)
    #[error("invalid window offset: {offset}ms, must be in [0, {slide})")]
    InvalidOffset { offset: i64, slide: i64 },

    /// Cannot assign event to window
    #[error("window assignment failed for timestamp {timestamp}: {reason}")]
    AssignmentFailed { timestamp: i64, reason: String },
}

/// Aggregation computation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// Percentile outside (0, 100]
    #[error("invalid percentile: {percentile}, must be in (0, 100]")]
    InvalidPercentile { percentile: f64 },

    /// Two accumulators for different keys were merged
    #[error("cannot merge accumulators of different devices: {left} vs {right}")]
    KeyMismatch { left: String, right: String },
}

/// Watermark and timer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatermarkError {
    /// Firing timer arithmetic left the i64 range
    #[error("timer overflow computing {operation} for window starting at {window_start}")]
    TimerOverflow {
        operation: &'static str,
        window_start: i64,
    },
}

/// Result sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// A single delivery attempt failed, may be retried
    #[error("delivery failed: {reason}")]
    Delivery { reason: String },

    /// The sink gave up after repeated failures
    #[error("sink exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// Delivery was abandoned because the engine is shutting down
    #[error("delivery cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    /// The sink can no longer accept payloads, retrying is pointless
    #[error("sink closed")]
    Closed,

    /// I/O error writing to the sink
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("{feature} is not supported")]
    Unsupported { feature: &'static str },
}

/// Result type alias for processor operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Result type alias for window operations
pub type WindowResult<T> = std::result::Result<T, WindowError>;

/// Result type alias for aggregation operations
pub type AggregationResult<T> = std::result::Result<T, AggregationError>;

/// Result type alias for watermark operations
pub type WatermarkResult<T> = std::result::Result<T, WatermarkError>;

/// Result type alias for sink operations
pub type SinkResult<T> = std::result::Result<T, SinkError>;

impl From<serde_json::Error> for ProcessorError {
    fn from(err: serde_json::Error) -> Self {
        ProcessorError::Serialization(err.to_string())
    }
}

impl From<cpu_p95_types::TypesError> for ProcessorError {
    fn from(err: cpu_p95_types::TypesError) -> Self {
        ProcessorError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_error_display() {
        let err = WindowError::InvalidWindowSize { size: 0 };
        assert!(err.to_string().contains("invalid window size"));
    }

    #[test]
    fn test_aggregation_error_display() {
        let err = AggregationError::InvalidPercentile { percentile: 120.0 };
        assert!(err.to_string().contains("invalid percentile"));
    }

    #[test]
    fn test_watermark_error_display() {
        let err = WatermarkError::TimerOverflow {
            operation: "firing time",
            window_start: i64::MAX,
        };
        assert!(err.to_string().contains("timer overflow"));
    }

    #[test]
    fn test_sink_error_display() {
        let err = SinkError::Exhausted {
            attempts: 4,
            last_error: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("exhausted after 4 attempts"));
    }

    #[test]
    fn test_processor_error_from_window_error() {
        let window_err = WindowError::InvalidWindowSize { size: 0 };
        let processor_err: ProcessorError = window_err.into();
        assert!(matches!(processor_err, ProcessorError::Window(_)));
    }

    #[test]
    fn test_processor_error_from_validation_error() {
        let err: ProcessorError = ValidationError::Unsupported {
            feature: "persistent window state",
        }
        .into();
        assert!(matches!(err, ProcessorError::Configuration(_)));
    }
}
