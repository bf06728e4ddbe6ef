//! Remote HTTP provider speaking the OpenAI-compatible embeddings wire
//! shape: `POST {base_url}/embeddings` with `{model, input, dimensions}`.
//!
//! Upstream surface errors are mapped to the engine taxonomy here; retry
//! is the pool's decision, made on the mapped error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;

use quarry_core::config::ProviderConfig;
use quarry_core::errors::{ProviderError, QuarryError, QuarryResult};
use quarry_core::models::{ProviderHealth, ProviderMetricsSnapshot};
use quarry_core::traits::EmbeddingProvider;

pub const PROVIDER_ID: &str = "remote-http";

const MAX_BATCH: usize = 2048;
const MAX_TEXT_CHARS: usize = 100_000;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct HttpProvider {
    model_id: String,
    dimensions: usize,
    base_url: String,
    api_key: Option<String>,
    headers: Vec<(String, String)>,
    client: reqwest::blocking::Client,
    requests: AtomicU64,
    errors: AtomicU64,
    latency_us: AtomicU64,
    tokens_used: AtomicU64,
}

impl HttpProvider {
    /// Build the blocking client. Must run on a thread where blocking is
    /// allowed; the pool constructs providers from its blocking context.
    pub fn new(model_id: &str, dimensions: usize, cfg: &ProviderConfig) -> QuarryResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms.max(1_000)))
            .build()
            .map_err(|e| ProviderError::Unavailable {
                provider: PROVIDER_ID.to_string(),
                reason: format!("http client build failed: {e}"),
            })?;

        Ok(Self {
            model_id: model_id.to_string(),
            dimensions,
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: cfg.api_key.clone(),
            headers: cfg
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            client,
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latency_us: AtomicU64::new(0),
            tokens_used: AtomicU64::new(0),
        })
    }

    fn request(&self, texts: &[String]) -> QuarryResult<Vec<Vec<f32>>> {
        let t0 = Instant::now();
        self.requests.fetch_add(1, Ordering::Relaxed);

        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model_id,
            "input": texts,
            "dimensions": self.dimensions,
        });

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().map_err(|e| {
            self.errors.fetch_add(1, Ordering::Relaxed);
            let status = e.status().map(|s| s.as_u16());
            QuarryError::from(ProviderError::Network {
                provider: PROVIDER_ID.to_string(),
                status,
                reason: e.to_string(),
            })
        })?;

        let status = response.status();
        if !status.is_success() {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return Err(self.map_error_status(status.as_u16(), &response_headers(&response)));
        }

        let payload: serde_json::Value = response.json().map_err(|e| {
            self.errors.fetch_add(1, Ordering::Relaxed);
            QuarryError::from(ProviderError::Internal {
                provider: PROVIDER_ID.to_string(),
                reason: format!("response body not JSON: {e}"),
            })
        })?;

        if let Some(total) = payload
            .pointer("/usage/total_tokens")
            .and_then(serde_json::Value::as_u64)
        {
            self.tokens_used.fetch_add(total, Ordering::Relaxed);
        }

        let vectors = parse_embeddings(&payload, texts.len(), self.dimensions)?;
        self.latency_us
            .fetch_add(t0.elapsed().as_micros() as u64, Ordering::Relaxed);
        Ok(vectors)
    }

    /// HTTP status → taxonomy. 401/403 are authentication (never retried),
    /// 429 is quota with an optional reset time, everything else 4xx/5xx
    /// is network (retryable per the pool's rules).
    fn map_error_status(&self, status: u16, retry_after: &Option<u64>) -> QuarryError {
        match status {
            401 | 403 => ProviderError::Authentication {
                provider: PROVIDER_ID.to_string(),
                reason: format!("upstream returned {status}"),
            }
            .into(),
            429 => ProviderError::Quota {
                provider: PROVIDER_ID.to_string(),
                reset_after_ms: retry_after.map(|secs| secs * 1000),
            }
            .into(),
            other => ProviderError::Network {
                provider: PROVIDER_ID.to_string(),
                status: Some(other),
                reason: format!("upstream returned {other}"),
            }
            .into(),
        }
    }
}

fn response_headers(response: &reqwest::blocking::Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

/// Extract `data[].embedding`, honoring `data[].index` so out-of-order
/// responses still line up with the input. A success envelope with
/// missing or wrong-dimension vectors is a provider-internal error.
fn parse_embeddings(
    payload: &serde_json::Value,
    expected_count: usize,
    expected_dims: usize,
) -> QuarryResult<Vec<Vec<f32>>> {
    let internal = |reason: String| -> QuarryError {
        ProviderError::Internal {
            provider: PROVIDER_ID.to_string(),
            reason,
        }
        .into()
    };

    let data = payload
        .get("data")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| internal("missing data array".to_string()))?;

    if data.len() != expected_count {
        return Err(internal(format!(
            "expected {expected_count} embeddings, got {}",
            data.len()
        )));
    }

    let mut vectors: Vec<Option<Vec<f32>>> = vec![None; expected_count];
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(serde_json::Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(position);
        if index >= expected_count {
            return Err(internal(format!("embedding index {index} out of range")));
        }
        let raw = item
            .get("embedding")
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| internal(format!("missing embedding at index {index}")))?;
        let vector: Vec<f32> = raw
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        if vector.len() != expected_dims {
            return Err(QuarryError::from(ProviderError::DimensionMismatch {
                expected: expected_dims,
                actual: vector.len(),
            }));
        }
        vectors[index] = Some(vector);
    }

    vectors
        .into_iter()
        .map(|v| v.ok_or_else(|| internal("duplicate embedding index".to_string())))
        .collect()
}

impl EmbeddingProvider for HttpProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    fn model_id(&self) -> &str {
        &self.model_id
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
        let mut vectors = self.request(std::slice::from_ref(&text.to_string()))?;
        vectors.pop().ok_or_else(|| {
            ProviderError::Internal {
                provider: PROVIDER_ID.to_string(),
                reason: "empty embedding response".to_string(),
            }
            .into()
        })
    }

    fn embed_batch(&self, texts: &[String]) -> QuarryResult<Vec<Vec<f32>>> {
        if texts.len() > MAX_BATCH {
            return Err(QuarryError::invalid_input(format!(
                "batch of {} exceeds provider limit of {MAX_BATCH}",
                texts.len()
            )));
        }
        self.request(texts)
    }

    fn health_check(&self) -> ProviderHealth {
        // A cheap reachability probe; unauthenticated 401s still prove
        // the transport works.
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        match self.client.post(&url).json(&json!({})).send() {
            Ok(_) => ProviderHealth::healthy("reachable"),
            Err(e) => ProviderHealth::unhealthy(format!("unreachable: {e}")),
        }
    }

    fn metrics(&self) -> ProviderMetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_us = self.latency_us.load(Ordering::Relaxed);
        let mut extra = std::collections::BTreeMap::new();
        extra.insert(
            "tokens_used".to_string(),
            serde_json::json!(self.tokens_used.load(Ordering::Relaxed)),
        );
        ProviderMetricsSnapshot {
            requests,
            errors: self.errors.load(Ordering::Relaxed),
            avg_latency_ms: if requests == 0 {
                0.0
            } else {
                total_us as f64 / requests as f64 / 1000.0
            },
            extra,
        }
    }
}
