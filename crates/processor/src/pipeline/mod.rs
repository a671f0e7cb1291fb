//! Sharded execution of the window engine
//!
//! [`StreamExecutor`] validates the configuration and spawns one
//! [`ShardWorker`] task per unit of parallelism plus the result emitter.
//! Samples are routed by device id, so all windows of a device live on one
//! shard, while watermark advances are broadcast to every shard.
//!
//! # Example
//!
//! ```rust,no_run
//! use processor::config::EngineConfig;
//! use processor::io::NdjsonSource;
//! use processor::pipeline::StreamExecutor;
//! use processor::sink::MemorySink;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> processor::error::Result<()> {
//! let sink = Arc::new(MemorySink::new());
//! let mut engine = StreamExecutor::new(EngineConfig::default(), sink).start()?;
//!
//! let mut source = NdjsonSource::stdin();
//! engine.run_source(&mut source, CancellationToken::new()).await?;
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod shard;

pub use executor::{shard_for, ExecutorStats, RunningExecutor, StreamExecutor};
pub use shard::{run_shard, SampleOutcome, ShardMessage, ShardStats, ShardWorker};
