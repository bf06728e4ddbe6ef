//! Preprocessing fingerprint: a stable digest of the text-processing
//! configuration, folded into cache keys so a config change yields a cache
//! miss instead of a stale (or wrong-dimension) hit.

use quarry_core::config::TextProcessingConfig;

/// Digest the config via its canonical JSON form. serde_json maps are
/// sorted, so semantically equal configs always produce the same string
/// regardless of construction order.
pub fn preprocessing_fingerprint(cfg: &TextProcessingConfig) -> String {
    let canonical =
        serde_json::to_string(cfg).expect("TextProcessingConfig serializes infallibly");
    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::config::TruncationConfig;

    #[test]
    fn equal_configs_equal_fingerprints() {
        let a = TextProcessingConfig::default();
        let b = TextProcessingConfig::default();
        assert_eq!(preprocessing_fingerprint(&a), preprocessing_fingerprint(&b));
    }

    #[test]
    fn any_field_change_changes_fingerprint() {
        let base = TextProcessingConfig::default();
        let lowercased = TextProcessingConfig {
            lowercase: true,
            ..base.clone()
        };
        let truncated = TextProcessingConfig {
            truncation: TruncationConfig {
                max_characters: Some(100),
                ..TruncationConfig::default()
            },
            ..base.clone()
        };
        let fp_base = preprocessing_fingerprint(&base);
        assert_ne!(fp_base, preprocessing_fingerprint(&lowercased));
        assert_ne!(fp_base, preprocessing_fingerprint(&truncated));
    }
}
