//! Deterministic local provider: signed feature hashing of terms into a
//! fixed-dimension vector, L2-normalized. No model artifacts, no network;
//! this is the always-available local slot of the provider pool and the
//! last line of graceful degradation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use quarry_core::constants::is_supported_dimension;
use quarry_core::errors::{ConfigError, QuarryError, QuarryResult};
use quarry_core::models::{ProviderHealth, ProviderMetricsSnapshot};
use quarry_core::traits::EmbeddingProvider;

pub const PROVIDER_ID: &str = "local-hash";
pub const MODEL_ID: &str = "term-hash-v1";

const MAX_BATCH: usize = 256;
const MAX_TEXT_CHARS: usize = 32_768;

pub struct HashProvider {
    dimensions: usize,
    requests: AtomicU64,
    errors: AtomicU64,
    latency_us: AtomicU64,
}

impl HashProvider {
    /// Any dimensionality from the supported set works; the vector space
    /// is synthesized, not model-bound.
    pub fn new(dimensions: usize) -> QuarryResult<Self> {
        if !is_supported_dimension(dimensions) {
            return Err(ConfigError::UnsupportedDimensions {
                dimensions,
                supported: &quarry_core::constants::SUPPORTED_DIMENSIONS,
            }
            .into());
        }
        Ok(Self {
            dimensions,
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency_us: AtomicU64::new(0),
        })
    }

    /// FNV-1a over the term; low bits pick the bucket, one high bit picks
    /// the sign. Signed buckets keep colliding terms from always
    /// reinforcing each other.
    fn term_slot(term: &str, dims: usize) -> (usize, f32) {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= u64::from(*b);
            h = h.wrapping_mul(0x100000001b3);
        }
        let bucket = (h % dims as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| t.len() >= 2)
            .map(str::to_lowercase)
            .collect()
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        if tokens.is_empty() {
            return vec![0.0; self.dimensions];
        }

        let mut frequencies: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *frequencies.entry(token.as_str()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        let mut vector = vec![0.0f32; self.dimensions];
        for (term, count) in &frequencies {
            let weight = (count / total) * (1.0 + (term.len() as f32).ln());
            let (bucket, sign) = Self::term_slot(term, self.dimensions);
            vector[bucket] += sign * weight;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl EmbeddingProvider for HashProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    fn model_id(&self) -> &str {
        MODEL_ID
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH
    }

    fn max_text_length(&self) -> usize {
        MAX_TEXT_CHARS
    }

    fn embed(&self, text: &str) -> QuarryResult<Vec<f32>> {
        let t0 = Instant::now();
        if text.chars().count() > MAX_TEXT_CHARS {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return Err(QuarryError::invalid_input(format!(
                "text exceeds provider limit of {MAX_TEXT_CHARS} characters"
            )));
        }
        let vector = self.vectorize(text);
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.latency_us
            .fetch_add(t0.elapsed().as_micros() as u64, Ordering::Relaxed);
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> QuarryResult<Vec<Vec<f32>>> {
        if texts.len() > MAX_BATCH {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return Err(QuarryError::invalid_input(format!(
                "batch of {} exceeds provider limit of {MAX_BATCH}",
                texts.len()
            )));
        }
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn health_check(&self) -> ProviderHealth {
        ProviderHealth::healthy("ready")
    }

    fn metrics(&self) -> ProviderMetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_us = self.latency_us.load(Ordering::Relaxed);
        ProviderMetricsSnapshot {
            requests,
            errors: self.errors.load(Ordering::Relaxed),
            avg_latency_ms: if requests == 0 {
                0.0
            } else {
                total_us as f64 / requests as f64 / 1000.0
            },
            extra: Default::default(),
        }
    }
}
