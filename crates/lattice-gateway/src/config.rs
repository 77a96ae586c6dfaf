//! Gateway configuration.

use lattice_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// Configuration for one gateway instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Resolver engine tunables (lookup concurrency, query timeout).
    pub engine: EngineConfig,
}
