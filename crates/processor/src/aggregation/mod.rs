//! Aggregation module for computing the per-window CPU percentile
//!
//! - [`AggregateFunction`]: create / add / merge / finalize contract
//! - [`CpuPercentileAggregate`]: the p95 aggregate over [`CpuAccumulator`]s
//! - [`Percentile`]: the percentile estimator used at finalization
//!
//! # Examples
//!
//! ```rust
//! use cpu_p95_types::CpuSample;
//! use processor::aggregation::{AggregateFunction, CpuPercentileAggregate};
//! use processor::window::{WindowBounds, WindowInstance};
//!
//! let aggregate = CpuPercentileAggregate::default();
//! let mut acc = aggregate.create_accumulator();
//! aggregate.add(&CpuSample::new("d1", 1_000, 60.0), &mut acc);
//! aggregate.add(&CpuSample::new("d1", 2_000, 90.0), &mut acc);
//!
//! let window = WindowInstance::new("d1", WindowBounds::new(0, 30_000));
//! let result = aggregate.finalize(&window, acc);
//! assert_eq!(result.percentile95, 90.0);
//! assert_eq!(result.window_start, 1_000);
//! ```

pub mod cpu;
pub mod percentile;
pub mod trait_;

pub use cpu::{deterministic_result_id, CpuAccumulator, CpuPercentileAggregate};
pub use percentile::{percentile, Percentile};
pub use trait_::AggregateFunction;
