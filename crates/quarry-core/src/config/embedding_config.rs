use serde::{Deserialize, Serialize};

use super::defaults;
use super::text_config::TextProcessingConfig;

/// Per-collection embedding behaviour. Provider, model, and dimensions are
/// immutable after collection creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionEmbeddingConfig {
    /// Provider id: "local-hash", "remote-http", ...
    pub provider_id: String,
    pub model_id: String,
    pub dimensions: usize,
    /// Shard size for batch embedding.
    pub batch_size: usize,
    pub cache_enabled: bool,
    /// Per-call embedding timeout (milliseconds).
    pub timeout_ms: u64,
    /// Embed document content automatically on insert.
    pub auto_generate: bool,
    /// Allow falling back to a same-dimension secondary provider.
    pub allow_fallback: bool,
    pub fallback_provider: Option<String>,
    pub text_preprocessing: TextProcessingConfig,
}

impl Default for CollectionEmbeddingConfig {
    fn default() -> Self {
        Self {
            provider_id: "local-hash".to_string(),
            model_id: "term-hash-v1".to_string(),
            dimensions: 384,
            batch_size: defaults::DEFAULT_EMBEDDING_BATCH_SIZE,
            cache_enabled: true,
            timeout_ms: defaults::DEFAULT_EMBED_TIMEOUT_MS,
            auto_generate: false,
            allow_fallback: false,
            fallback_provider: None,
            text_preprocessing: TextProcessingConfig::default(),
        }
    }
}
