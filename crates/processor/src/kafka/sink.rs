//! Kafka result sink
//!
//! Publishes every serialized result keyed by device id. Delivery is
//! at-least-once: the emitter retries failed sends.

use super::config::KafkaSinkConfig;
use crate::error::{ProcessorError, Result, SinkError, SinkResult};
use crate::sink::ResultSink;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info};

/// Kafka producer implementing [`ResultSink`]
pub struct KafkaSink {
    producer: FutureProducer,
    config: KafkaSinkConfig,
    name: String,
}

impl KafkaSink {
    pub fn new(config: KafkaSinkConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("acks", &config.acks)
            .set("compression.type", &config.compression_type)
            .set("message.timeout.ms", config.send_timeout_ms.to_string());

        for (key, value) in &config.extra_config {
            client_config.set(key, value);
        }

        let producer: FutureProducer =
            client_config
                .create()
                .map_err(|e| ProcessorError::Kafka {
                    source: Box::new(e),
                })?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            "Kafka sink created"
        );
        let name = format!("kafka:{}", config.topic);
        Ok(Self {
            producer,
            config,
            name,
        })
    }
}

#[async_trait]
impl ResultSink for KafkaSink {
    async fn send(&self, key: &str, payload: &[u8]) -> SinkResult<()> {
        let record = FutureRecord::to(&self.config.topic)
            .key(key)
            .payload(payload);

        match self
            .producer
            .send(record, Timeout::After(self.config.send_timeout()))
            .await
        {
            Ok((partition, offset)) => {
                debug!(
                    partition = partition,
                    offset = offset,
                    key = key,
                    "Result delivered"
                );
                Ok(())
            }
            Err((e, _)) => Err(SinkError::Delivery {
                reason: e.to_string(),
            }),
        }
    }

    async fn flush(&self) -> SinkResult<()> {
        self.producer
            .flush(Timeout::After(self.config.send_timeout()))
            .map_err(|e| SinkError::Delivery {
                reason: e.to_string(),
            })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
