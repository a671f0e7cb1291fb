//! Kafka integration
//!
//! [`KafkaSource`] consumes raw samples with a consumer group and feeds the
//! engine through the [`SampleSource`](crate::io::SampleSource) port.
//! [`KafkaSink`] publishes serialized results keyed by device id.
//!
//! # Example
//!
//! ```rust,no_run
//! use processor::config::EngineConfig;
//! use processor::kafka::{KafkaSink, KafkaSinkConfig, KafkaSource, KafkaSourceConfig};
//! use processor::pipeline::StreamExecutor;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> processor::error::Result<()> {
//! let mut source = KafkaSource::new(KafkaSourceConfig::default())?;
//! let sink = Arc::new(KafkaSink::new(KafkaSinkConfig::default())?);
//!
//! let mut engine = StreamExecutor::new(EngineConfig::default(), sink).start()?;
//! engine.run_source(&mut source, CancellationToken::new()).await?;
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod sink;
pub mod source;

pub use config::{KafkaSinkConfig, KafkaSourceConfig};
pub use sink::KafkaSink;
pub use source::KafkaSource;
