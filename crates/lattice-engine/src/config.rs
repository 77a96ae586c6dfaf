//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one resolver engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum concurrent backend lookups within one batch wave (and across
    /// root dispatches). Adapters are assumed concurrency-safe; this cap
    /// only keeps one query from overwhelming a backend.
    pub max_concurrent_lookups: usize,
    /// Per-execution timeout in milliseconds; `None` disables the timeout.
    /// Expiry cancels the execution through its cancellation token.
    pub query_timeout_ms: Option<u64>,
}

impl EngineConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: 8,
            query_timeout_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_lookups, 8);
        assert!(config.query_timeout().is_none());
    }

    #[test]
    fn test_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"query_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.max_concurrent_lookups, 8);
        assert_eq!(config.query_timeout(), Some(Duration::from_millis(250)));
    }
}
