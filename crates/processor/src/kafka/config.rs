//! Kafka client configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the Kafka sample source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KafkaSourceConfig {
    /// Kafka brokers (comma-separated list)
    #[serde(default = "default_brokers")]
    pub brokers: String,

    /// Consumer group ID
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Topic carrying raw CPU samples
    #[serde(default = "default_input_topic")]
    pub topic: String,

    /// Where to start when the group has no committed offset
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,

    /// Additional rdkafka consumer settings
    #[serde(default)]
    pub extra_config: HashMap<String, String>,
}

impl Default for KafkaSourceConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            group_id: default_group_id(),
            topic: default_input_topic(),
            auto_offset_reset: default_auto_offset_reset(),
            extra_config: HashMap::new(),
        }
    }
}

/// Configuration for the Kafka result sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KafkaSinkConfig {
    /// Kafka bootstrap servers
    #[serde(default = "default_brokers")]
    pub brokers: String,

    /// Topic receiving percentile results
    #[serde(default = "default_output_topic")]
    pub topic: String,

    /// Client ID for this producer
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Acknowledgment level (0, 1, all)
    #[serde(default = "default_acks")]
    pub acks: String,

    /// Compression type (none, gzip, snappy, lz4, zstd)
    #[serde(default = "default_compression")]
    pub compression_type: String,

    /// Timeout for a single delivery (milliseconds)
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    /// Additional rdkafka producer settings
    #[serde(default)]
    pub extra_config: HashMap<String, String>,
}

impl KafkaSinkConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for KafkaSinkConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_output_topic(),
            client_id: default_client_id(),
            acks: default_acks(),
            compression_type: default_compression(),
            send_timeout_ms: default_send_timeout(),
            extra_config: HashMap::new(),
        }
    }
}

fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_group_id() -> String {
    "cpu-usage-processor".to_string()
}

fn default_input_topic() -> String {
    "events".to_string()
}

fn default_output_topic() -> String {
    "processed-events".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_client_id() -> String {
    "cpu-p95-engine".to_string()
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_compression() -> String {
    "lz4".to_string()
}

fn default_send_timeout() -> u64 {
    30_000
}
