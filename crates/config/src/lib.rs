//! Configuration management for the CPU p95 engine
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! environment variables prefixed with `CPU_P95_`. Nested keys are separated
//! by a double underscore, e.g. `CPU_P95_WINDOW__SLIDE_MS=10000`.

use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use processor::config::{
    EmitterConfig, EngineConfig, IdStrategy, Interpolation, WatermarkConfig, WindowConfig,
};
use processor::metrics::MetricsServerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CPU_P95_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Sliding window shape and lateness
    #[serde(default)]
    pub window: WindowConfig,

    /// Watermark generation
    #[serde(default)]
    pub watermark: WatermarkConfig,

    /// Sharding and result generation
    #[serde(default)]
    pub engine: EngineSettings,

    /// Result delivery retries
    #[serde(default)]
    pub emitter: EmitterConfig,

    /// Logging and metrics
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Kafka input and output
    #[serde(default)]
    pub kafka: KafkaSettings,
}

impl Settings {
    /// Load settings from an optional YAML file and the environment
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::LoadError(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))
    }

    /// Engine configuration assembled from the window, watermark, engine and
    /// emitter sections
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            window: self.window.clone(),
            watermark: self.watermark.clone(),
            emitter: self.emitter.clone(),
            parallelism: self.engine.parallelism,
            channel_capacity: self.engine.channel_capacity,
            initial_accumulator_capacity: self.engine.initial_accumulator_capacity,
            flush_on_shutdown: self.engine.flush_on_shutdown,
            persistent_state_enabled: self.engine.persistent_state_enabled,
            id_strategy: self.engine.id_strategy,
            interpolation: self.engine.interpolation,
        }
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        self.engine_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.observability.metrics_enabled && self.observability.metrics_port == 0 {
            return Err(ConfigError::ValidationError(
                "Invalid metrics port".to_string(),
            ));
        }

        if self.kafka.enabled {
            if self.kafka.brokers.is_empty() {
                return Err(ConfigError::ValidationError(
                    "Kafka brokers required".to_string(),
                ));
            }
            if self.kafka.input_topic.is_empty() || self.kafka.output_topic.is_empty() {
                return Err(ConfigError::ValidationError(
                    "Kafka input and output topics required".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Engine section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Number of shard workers
    pub parallelism: usize,

    /// Capacity of the engine's bounded channels
    pub channel_capacity: usize,

    /// Initial value buffer size of a window accumulator
    pub initial_accumulator_capacity: usize,

    /// Finalize open windows on shutdown
    pub flush_on_shutdown: bool,

    /// Durable window state, not supported
    pub persistent_state_enabled: bool,

    pub id_strategy: IdStrategy,

    pub interpolation: Interpolation,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            parallelism: engine.parallelism,
            channel_capacity: engine.channel_capacity,
            initial_accumulator_capacity: engine.initial_accumulator_capacity,
            flush_on_shutdown: engine.flush_on_shutdown,
            persistent_state_enabled: engine.persistent_state_enabled,
            id_strategy: engine.id_strategy,
            interpolation: engine.interpolation,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level, used when `RUST_LOG` is not set
    pub log_level: String,

    /// Enable structured JSON logging
    pub json_logging: bool,

    /// Serve `/metrics`, `/health` and `/ready`
    pub metrics_enabled: bool,

    /// Metrics server bind address
    pub metrics_bind: String,

    /// Metrics server port
    pub metrics_port: u16,
}

impl ObservabilityConfig {
    pub fn metrics_server(&self) -> MetricsServerConfig {
        MetricsServerConfig::new(self.metrics_bind.clone(), self.metrics_port)
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            metrics_enabled: true,
            metrics_bind: "0.0.0.0".to_string(),
            metrics_port: 9090,
        }
    }
}

/// Kafka section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaSettings {
    /// Read samples from and write results to Kafka instead of stdin/stdout
    pub enabled: bool,

    pub brokers: String,

    pub input_topic: String,

    pub output_topic: String,

    pub group_id: String,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: "localhost:9092".to_string(),
            input_topic: "events".to_string(),
            output_topic: "processed-events".to_string(),
            group_id: "cpu-usage-processor".to_string(),
        }
    }
}
