//! Error types for sample decoding and validation

use thiserror::Error;

/// Reasons a sample is rejected before it reaches window assignment
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("sample has an empty device id")]
    EmptyDeviceId,

    #[error("cpu usage is not a finite number: {value}")]
    NonFiniteUsage { value: f64 },

    #[error("cpu usage {value} is outside [0, 100]")]
    UsageOutOfRange { value: f64 },
}

/// Errors raised when decoding wire payloads
#[derive(Error, Debug)]
pub enum TypesError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid sample: {0}")]
    Invalid(#[from] SampleError),
}

/// Result type alias for decoding operations
pub type Result<T> = std::result::Result<T, TypesError>;
