//! Label sets for engine metrics

use cpu_p95_types::SampleError;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use std::fmt;

/// Why an inbound sample was dropped before window assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum RejectReason {
    Malformed,
    EmptyDeviceId,
    NonFiniteUsage,
    OutOfRange,
}

impl From<&SampleError> for RejectReason {
    fn from(err: &SampleError) -> Self {
        match err {
            SampleError::EmptyDeviceId => RejectReason::EmptyDeviceId,
            SampleError::NonFiniteUsage { .. } => RejectReason::NonFiniteUsage,
            SampleError::UsageOutOfRange { .. } => RejectReason::OutOfRange,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Malformed => write!(f, "malformed"),
            RejectReason::EmptyDeviceId => write!(f, "empty_device_id"),
            RejectReason::NonFiniteUsage => write!(f, "non_finite_usage"),
            RejectReason::OutOfRange => write!(f, "out_of_range"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct RejectLabels {
    pub reason: RejectReason,
}

impl RejectLabels {
    pub fn new(reason: RejectReason) -> Self {
        Self { reason }
    }
}
