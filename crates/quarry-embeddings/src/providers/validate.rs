//! Provider configuration validation, run before any instance is built.
//! Produces a report with actionable suggestions rather than a bare error.

use quarry_core::config::{CollectionEmbeddingConfig, ProviderConfig};
use quarry_core::constants::{is_supported_dimension, SUPPORTED_DIMENSIONS};
use quarry_core::models::{EnvironmentCaps, ValidationReport};

use super::{hash_provider, http_provider};

/// Dimensions each known model can emit. Unknown models pass with a
/// warning; the dimension check against the supported set still applies.
const MODEL_DIMENSIONS: &[(&str, &[usize])] = &[
    (hash_provider::MODEL_ID, &SUPPORTED_DIMENSIONS),
    ("text-embedding-3-small", &[256, 512, 1536]),
    ("text-embedding-3-large", &[256, 1024, 3072]),
];

const MIN_TIMEOUT_MS: u64 = 1_000;

pub fn validate_provider_config(
    embedding: &CollectionEmbeddingConfig,
    provider: &ProviderConfig,
    caps: &EnvironmentCaps,
) -> ValidationReport {
    let mut report = ValidationReport::ok();

    if embedding.provider_id.is_empty() {
        report.push_error("provider_id is required");
    }
    if embedding.model_id.is_empty() {
        report.push_error("model_id is required");
    }

    if !is_supported_dimension(embedding.dimensions) {
        report.push_error(format!(
            "dimensions {} not in supported set {:?}",
            embedding.dimensions, SUPPORTED_DIMENSIONS
        ));
        report
            .suggestions
            .push("pick one of the supported dimensionalities, e.g. 384 or 1536".to_string());
    }

    match MODEL_DIMENSIONS
        .iter()
        .find(|(model, _)| *model == embedding.model_id)
    {
        Some((_, dims)) if !dims.contains(&embedding.dimensions) => {
            report.push_error(format!(
                "model {} does not support {} dimensions (supports {:?})",
                embedding.model_id, embedding.dimensions, dims
            ));
        }
        None if !embedding.model_id.is_empty() => {
            report.warnings.push(format!(
                "model {} is not in the known-model table; dimension compatibility is unchecked",
                embedding.model_id
            ));
        }
        _ => {}
    }

    if embedding.batch_size == 0 {
        report.push_error("batch_size must be at least 1");
    }
    let provider_max = match embedding.provider_id.as_str() {
        hash_provider::PROVIDER_ID => 256,
        http_provider::PROVIDER_ID => 2048,
        _ => usize::MAX,
    };
    if embedding.batch_size > provider_max {
        report.push_error(format!(
            "batch_size {} exceeds provider limit {provider_max}",
            embedding.batch_size
        ));
    }

    if embedding.timeout_ms < MIN_TIMEOUT_MS {
        report.push_error(format!(
            "timeout {}ms is below the {MIN_TIMEOUT_MS}ms minimum",
            embedding.timeout_ms
        ));
    }

    if embedding.provider_id == http_provider::PROVIDER_ID {
        match &provider.api_key {
            Some(key) if looks_like_api_key(key) => {}
            Some(_) => {
                report.push_error("api_key has an invalid format");
                report
                    .suggestions
                    .push("remote API keys look like `sk-` followed by 20+ characters".to_string());
            }
            None => {
                report
                    .warnings
                    .push("no api_key configured; the upstream may reject requests".to_string());
            }
        }
        if !caps.http_transport {
            report.push_error("environment has no HTTP transport");
            report
                .suggestions
                .push(format!("use the {} provider instead", hash_provider::PROVIDER_ID));
        }
    }

    report
}

fn looks_like_api_key(key: &str) -> bool {
    key.starts_with("sk-") && key.len() >= 23 && key.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_cfg() -> CollectionEmbeddingConfig {
        CollectionEmbeddingConfig::default()
    }

    #[test]
    fn default_local_config_is_valid() {
        let report =
            validate_provider_config(&local_cfg(), &ProviderConfig::default(), &EnvironmentCaps::default());
        assert!(report.is_valid, "{:?}", report.errors);
    }

    #[test]
    fn unsupported_dimensions_rejected_with_suggestion() {
        let cfg = CollectionEmbeddingConfig {
            dimensions: 100,
            ..local_cfg()
        };
        let report =
            validate_provider_config(&cfg, &ProviderConfig::default(), &EnvironmentCaps::default());
        assert!(!report.is_valid);
        assert!(!report.suggestions.is_empty());
    }

    #[test]
    fn model_dimension_compatibility_checked() {
        let cfg = CollectionEmbeddingConfig {
            provider_id: http_provider::PROVIDER_ID.to_string(),
            model_id: "text-embedding-3-small".to_string(),
            dimensions: 3072, // supported set, but not by this model
            ..local_cfg()
        };
        let report =
            validate_provider_config(&cfg, &ProviderConfig::default(), &EnvironmentCaps::default());
        assert!(!report.is_valid);
    }

    #[test]
    fn short_timeout_rejected() {
        let cfg = CollectionEmbeddingConfig {
            timeout_ms: 500,
            ..local_cfg()
        };
        let report =
            validate_provider_config(&cfg, &ProviderConfig::default(), &EnvironmentCaps::default());
        assert!(!report.is_valid);
    }

    #[test]
    fn bad_api_key_shape_rejected() {
        let cfg = CollectionEmbeddingConfig {
            provider_id: http_provider::PROVIDER_ID.to_string(),
            model_id: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            ..local_cfg()
        };
        let provider = ProviderConfig {
            api_key: Some("not-a-key".to_string()),
            ..ProviderConfig::default()
        };
        let report = validate_provider_config(&cfg, &provider, &EnvironmentCaps::default());
        assert!(!report.is_valid);
    }

    #[test]
    fn missing_http_transport_suggests_local() {
        let cfg = CollectionEmbeddingConfig {
            provider_id: http_provider::PROVIDER_ID.to_string(),
            model_id: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            ..local_cfg()
        };
        let caps = EnvironmentCaps {
            http_transport: false,
            ..EnvironmentCaps::default()
        };
        let report = validate_provider_config(&cfg, &ProviderConfig::default(), &caps);
        assert!(!report.is_valid);
        assert!(report
            .suggestions
            .iter()
            .any(|s| s.contains(hash_provider::PROVIDER_ID)));
    }
}
