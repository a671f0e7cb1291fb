//! Window state management
//!
//! Window state is memory-resident and owned by exactly one shard worker, so
//! the store needs no synchronization. State does not survive a restart.

pub mod store;

pub use store::WindowStateStore;
