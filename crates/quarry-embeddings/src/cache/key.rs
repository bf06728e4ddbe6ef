//! Cache key fingerprinting.
//!
//! The key digests the full identity tuple — text hash, provider, model,
//! dimensions, preprocessing fingerprint, optional salt — so changing any
//! of them yields a miss instead of a dimension mismatch. Fields are
//! serialized through a sorted-key JSON map, so construction order can
//! never leak into the digest.

use std::fmt;

/// A computed cache key (blake3 hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(
        text_hash: &str,
        provider_id: &str,
        model_id: &str,
        dimensions: usize,
        preprocessing_fingerprint: &str,
        salt: Option<&str>,
    ) -> Self {
        // serde_json maps sort keys by default; this is the canonical form.
        let canonical = serde_json::json!({
            "dimensions": dimensions,
            "fingerprint": preprocessing_fingerprint,
            "model": model_id,
            "provider": provider_id,
            "salt": salt.unwrap_or(""),
            "text_hash": text_hash,
        })
        .to_string();
        Self(blake3::hash(canonical.as_bytes()).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_identical_keys() {
        let a = CacheKey::compute("h", "p", "m", 384, "fp", None);
        let b = CacheKey::compute("h", "p", "m", 384, "fp", None);
        assert_eq!(a, b);
    }

    #[test]
    fn every_component_matters() {
        let base = CacheKey::compute("h", "p", "m", 384, "fp", None);
        assert_ne!(base, CacheKey::compute("h2", "p", "m", 384, "fp", None));
        assert_ne!(base, CacheKey::compute("h", "p2", "m", 384, "fp", None));
        assert_ne!(base, CacheKey::compute("h", "p", "m2", 384, "fp", None));
        assert_ne!(base, CacheKey::compute("h", "p", "m", 512, "fp", None));
        assert_ne!(base, CacheKey::compute("h", "p", "m", 384, "fp2", None));
        assert_ne!(base, CacheKey::compute("h", "p", "m", 384, "fp", Some("s")));
    }

    #[test]
    fn empty_salt_equals_no_salt() {
        assert_eq!(
            CacheKey::compute("h", "p", "m", 384, "fp", None),
            CacheKey::compute("h", "p", "m", 384, "fp", Some(""))
        );
    }
}
