//! Event-time window engine computing the per-device CPU 95th percentile
//!
//! Samples are assigned to overlapping sliding windows per device, folded
//! into accumulators, and finalized once the watermark passes the window end
//! plus the allowed lateness. Samples arriving after all their windows fired
//! go to a late side channel.

pub mod aggregation;
pub mod clock;
pub mod config;
pub mod error;
pub mod io;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod state;
pub mod watermark;
pub mod window;

// Re-export commonly used types
pub use aggregation::{AggregateFunction, CpuAccumulator, CpuPercentileAggregate, Percentile};

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};

pub use config::{
    EmitterConfig, EngineConfig, IdStrategy, Interpolation, WatermarkConfig, WindowConfig,
};

pub use error::{
    AggregationError, ProcessorError, Result as ProcessorResult, SinkError, ValidationError,
    WatermarkError, WindowError,
};

pub use io::{NdjsonSource, SampleSource, SourceRecord, WriterSink};

pub use metrics::{EngineMetrics, MetricsRegistry, MetricsServer, MetricsServerConfig};

pub use pipeline::{ExecutorStats, RunningExecutor, StreamExecutor};

pub use sink::{
    CollectingLateSink, LateDataSink, LoggingLateSink, MemorySink, ResultEmitter, ResultSink,
};

pub use watermark::{BoundedOutOfOrdernessWatermark, Watermark, WatermarkGenerator};

pub use window::{SlidingWindowAssigner, WindowAssigner, WindowBounds, WindowInstance};

#[cfg(feature = "kafka")]
pub use kafka::{KafkaSink, KafkaSinkConfig, KafkaSource, KafkaSourceConfig};
