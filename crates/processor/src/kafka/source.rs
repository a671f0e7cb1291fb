//! Kafka sample source
//!
//! Consumes raw sample payloads from one topic. The Kafka partition of each
//! message becomes its watermark partition. Offsets are stored once a record
//! has been handed to the engine and committed by rdkafka in the background.

use super::config::KafkaSourceConfig;
use crate::error::{ProcessorError, Result};
use crate::io::{SampleSource, SourceRecord};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use tracing::{debug, info, warn};

/// Kafka consumer yielding [`SourceRecord`]s
pub struct KafkaSource {
    consumer: StreamConsumer,
    config: KafkaSourceConfig,
    name: String,
}

impl KafkaSource {
    /// Create the consumer and subscribe to the configured topic
    pub fn new(config: KafkaSourceConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false");

        for (key, value) in &config.extra_config {
            client_config.set(key, value);
        }

        let consumer: StreamConsumer = client_config.create().map_err(kafka_error)?;
        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(kafka_error)?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Subscribed to sample topic"
        );
        let name = format!("kafka:{}", config.topic);
        Ok(Self {
            consumer,
            config,
            name,
        })
    }

    pub fn config(&self) -> &KafkaSourceConfig {
        &self.config
    }
}

#[async_trait]
impl SampleSource for KafkaSource {
    async fn next_record(&mut self) -> Result<Option<SourceRecord>> {
        loop {
            let message = self.consumer.recv().await.map_err(kafka_error)?;

            let Some(payload) = message.payload() else {
                debug!(
                    partition = message.partition(),
                    offset = message.offset(),
                    "Skipping message without payload"
                );
                continue;
            };

            let partition = u32::try_from(message.partition()).unwrap_or_default();
            let record = SourceRecord::new(partition, payload);

            if let Err(e) = self.consumer.store_offset_from_message(&message) {
                warn!(error = %e, "Failed to store consumer offset");
            }
            return Ok(Some(record));
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn kafka_error(err: rdkafka::error::KafkaError) -> ProcessorError {
    ProcessorError::Kafka {
        source: Box::new(err),
    }
}
