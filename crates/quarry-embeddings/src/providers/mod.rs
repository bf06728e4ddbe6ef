//! Provider construction: validate first, then build the tagged variant.

pub mod hash_provider;
pub mod http_provider;
pub mod validate;

use std::sync::Arc;

use quarry_core::config::{CollectionEmbeddingConfig, ProviderConfig};
use quarry_core::errors::{ConfigError, ProviderError, QuarryResult};
use quarry_core::models::EnvironmentCaps;
use quarry_core::traits::EmbeddingProvider;

pub use hash_provider::HashProvider;
pub use http_provider::HttpProvider;
pub use validate::validate_provider_config;

/// Validate and construct a provider instance. Construction failures carry
/// the validation report's first error; environment gaps surface as
/// `EnvironmentUnsupported` with alternatives.
pub fn create_provider(
    embedding: &CollectionEmbeddingConfig,
    provider_cfg: &ProviderConfig,
    caps: &EnvironmentCaps,
) -> QuarryResult<Arc<dyn EmbeddingProvider>> {
    let report = validate_provider_config(embedding, provider_cfg, caps);
    if !report.is_valid {
        if embedding.provider_id == http_provider::PROVIDER_ID && !caps.http_transport {
            return Err(ProviderError::EnvironmentUnsupported {
                provider: embedding.provider_id.clone(),
                requirements: vec!["http-transport".to_string()],
                alternatives: vec![hash_provider::PROVIDER_ID.to_string()],
            }
            .into());
        }
        return Err(ConfigError::Invalid {
            reason: report
                .errors
                .first()
                .cloned()
                .unwrap_or_else(|| "invalid provider configuration".to_string()),
        }
        .into());
    }

    match embedding.provider_id.as_str() {
        hash_provider::PROVIDER_ID => Ok(Arc::new(HashProvider::new(embedding.dimensions)?)),
        http_provider::PROVIDER_ID => Ok(Arc::new(HttpProvider::new(
            &embedding.model_id,
            embedding.dimensions,
            provider_cfg,
        )?)),
        other => Err(ProviderError::Unavailable {
            provider: other.to_string(),
            reason: "unknown provider id".to_string(),
        }
        .into()),
    }
}
