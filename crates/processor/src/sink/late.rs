use super::LateDataSink;
use crate::error::SinkResult;
use async_trait::async_trait;
use cpu_p95_types::LateSample;
use parking_lot::Mutex;
use tracing::warn;

/// Logs every late sample at warn level
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLateSink;

#[async_trait]
impl LateDataSink for LoggingLateSink {
    async fn on_late(&self, sample: LateSample) -> SinkResult<()> {
        warn!(
            device_id = %sample.device_id,
            event_time = sample.event_time,
            watermark = sample.watermark,
            "Late event: {} at {}",
            sample.device_id,
            sample.event_time
        );
        Ok(())
    }
}

/// Keeps late samples in memory
#[derive(Debug, Default)]
pub struct CollectingLateSink {
    samples: Mutex<Vec<LateSample>>,
}

impl CollectingLateSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<LateSample> {
        self.samples.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LateDataSink for CollectingLateSink {
    async fn on_late(&self, sample: LateSample) -> SinkResult<()> {
        self.samples.lock().push(sample);
        Ok(())
    }
}
