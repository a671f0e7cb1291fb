//! Windowing module for stream processing
//!
//! Only sliding event-time windows are supported. Windows are fixed-size and
//! overlapping, so a single sample belongs to several windows.
//!
//! ```text
//! Time:     0----5----10---15---20---25---30---35---40
//! Windows:  [-----------------------------)
//!                [-----------------------------)
//!                     [-----------------------------)
//! ```
//!
//! With the default 30s length and 5s slide every sample falls into six
//! windows per device.

pub mod assigner;
pub mod types;

pub use assigner::{SlidingWindowAssigner, WindowAssigner};
pub use types::{WindowBounds, WindowInstance};
