//! Core types and data models for the CPU p95 pipeline
//!
//! This crate provides the records that cross the engine boundary: the
//! per-device CPU samples coming in, the percentile results going out, and
//! the late-data records emitted on the side channel.

pub mod errors;
pub mod results;
pub mod samples;

pub use errors::{SampleError, TypesError};
pub use results::{LateSample, PercentileResult, UNKNOWN_DEVICE};
pub use samples::CpuSample;
