//! Engine configuration: serde structs with explicit defaults, loadable
//! from TOML. `defaults.rs` is the single source of truth for values.

pub mod cache_config;
pub mod control_config;
pub mod defaults;
pub mod embedding_config;
pub mod provider_config;
pub mod queue_config;
pub mod retrieval_config;
pub mod text_config;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use cache_config::{CacheConfig, CacheTierConfig, EvictionStrategy, HybridEvictionWeights};
pub use control_config::ControlConfig;
pub use embedding_config::CollectionEmbeddingConfig;
pub use provider_config::ProviderConfig;
pub use queue_config::QueueConfig;
pub use retrieval_config::RetrievalConfig;
pub use text_config::{HashAlgorithm, TextProcessingConfig, TruncationConfig, TruncationStrategy};

use crate::errors::{ConfigError, QuarryResult};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    pub control: ControlConfig,
    pub cache: CacheConfig,
    pub retrieval: RetrievalConfig,
    pub queue: QueueConfig,
    /// Provider transport settings keyed by provider id.
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl QuarryConfig {
    /// Parse a TOML configuration string. Unknown keys are ignored;
    /// missing keys take defaults.
    pub fn from_toml(input: &str) -> QuarryResult<Self> {
        toml::from_str(input).map_err(|e| {
            ConfigError::ParseFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Transport settings for a provider, defaulted when unconfigured.
    pub fn provider(&self, provider_id: &str) -> ProviderConfig {
        self.providers
            .get(provider_id)
            .cloned()
            .unwrap_or_default()
    }
}
