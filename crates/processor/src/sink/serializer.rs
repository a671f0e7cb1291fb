use crate::error::{ProcessorError, Result};
use async_trait::async_trait;
use serde::Serialize;

/// Payload emitted in place of a result that failed to serialize
pub const FALLBACK_PAYLOAD: &[u8] = b"{}";

/// Serializer trait for converting messages to bytes
#[async_trait]
pub trait MessageSerializer<T>: Send + Sync {
    /// Serialize message to bytes
    async fn serialize(&self, message: &T) -> Result<Vec<u8>>;

    /// Get content type identifier
    fn content_type(&self) -> &str;
}

/// JSON serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

#[async_trait]
impl<T: Serialize + Send + Sync> MessageSerializer<T> for JsonSerializer {
    async fn serialize(&self, message: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| ProcessorError::Serialization(e.to_string()))
    }

    fn content_type(&self) -> &str {
        "application/json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpu_p95_types::PercentileResult;

    #[tokio::test]
    async fn test_json_serializer() {
        let result = PercentileResult {
            id: "id-1".to_string(),
            device_id: "d1".to_string(),
            window_start: 1,
            window_end: 2,
            percentile95: 42.0,
            computed_at: 3,
        };

        let bytes = JsonSerializer.serialize(&result).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["deviceId"], "d1");
        assert_eq!(value["lastUpdated"], 3);
        assert_eq!(
            MessageSerializer::<PercentileResult>::content_type(&JsonSerializer),
            "application/json"
        );
    }

    #[test]
    fn test_fallback_payload_is_empty_object() {
        let value: serde_json::Value = serde_json::from_slice(FALLBACK_PAYLOAD).unwrap();
        assert!(value.as_object().unwrap().is_empty());
    }
}
