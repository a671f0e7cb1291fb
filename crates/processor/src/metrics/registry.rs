//! Shared prometheus registry
//!
//! The registry is created by the binary and handed to whoever registers or
//! exports metrics. There is no process-wide instance.

use super::{MetricsError, Result};
use parking_lot::RwLock;
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// Thread-safe registry for Prometheus metrics
pub struct MetricsRegistry {
    registry: Arc<RwLock<Registry>>,
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
        }
    }

    /// Get a reference to the internal registry
    pub fn registry(&self) -> Arc<RwLock<Registry>> {
        self.registry.clone()
    }

    /// Encode metrics in Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let registry = self.registry.read();
        let mut buffer = String::new();

        prometheus_client::encoding::text::encode(&mut buffer, &registry)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsRegistry {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.encode().is_ok());
    }

    #[test]
    fn test_registry_clone() {
        let registry1 = MetricsRegistry::new();
        let registry2 = registry1.clone();

        // Both should share the same underlying registry
        assert!(Arc::ptr_eq(&registry1.registry(), &registry2.registry()));
    }
}
