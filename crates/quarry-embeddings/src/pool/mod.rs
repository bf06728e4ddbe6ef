//! Provider pool: lifecycle, rate limiting, retry, and fallback for the
//! provider instances shared by every caller.

pub mod rate_limiter;
pub mod retry;

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use quarry_core::cancel::CancelFlag;
use quarry_core::config::{CollectionEmbeddingConfig, QuarryConfig};
use quarry_core::errors::{ProviderError, QuarryError, QuarryResult};
use quarry_core::models::{EnvironmentCaps, ProviderHealth, ProviderMetricsSnapshot};
use quarry_core::traits::EmbeddingProvider;

use crate::providers;
use rate_limiter::TokenBucket;

/// Identity of a pooled provider instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderKey {
    pub provider_id: String,
    pub model_id: String,
    pub dimensions: usize,
}

impl ProviderKey {
    pub fn from_config(cfg: &CollectionEmbeddingConfig) -> Self {
        Self {
            provider_id: cfg.provider_id.clone(),
            model_id: cfg.model_id.clone(),
            dimensions: cfg.dimensions,
        }
    }
}

struct ProviderSlot {
    provider: Arc<dyn EmbeddingProvider>,
    limiter: TokenBucket,
    max_retries: u32,
    retry_base_ms: u64,
}

/// Shared pool. Instances are constructed and warmed on first use and
/// reused by every caller afterwards.
pub struct ProviderPool {
    slots: DashMap<ProviderKey, Arc<ProviderSlot>>,
    config: QuarryConfig,
    caps: EnvironmentCaps,
}

impl ProviderPool {
    pub fn new(config: QuarryConfig, caps: EnvironmentCaps) -> Self {
        Self {
            slots: DashMap::new(),
            config,
            caps,
        }
    }

    /// Pre-register a provider instance (tests inject mocks this way; the
    /// engine can use it to seed warmed providers).
    pub fn register(&self, key: ProviderKey, provider: Arc<dyn EmbeddingProvider>) {
        let transport = self.config.provider(&key.provider_id);
        let slot = Arc::new(ProviderSlot {
            provider,
            limiter: TokenBucket::from_rpm(transport.requests_per_minute),
            max_retries: transport.max_retries,
            retry_base_ms: transport.retry_base_ms,
        });
        self.slots.insert(key, slot);
    }

    /// Whether a ready instance exists or can be built for this config.
    pub fn is_available(&self, cfg: &CollectionEmbeddingConfig) -> bool {
        let key = ProviderKey::from_config(cfg);
        if self.slots.contains_key(&key) {
            return true;
        }
        providers::validate_provider_config(cfg, &self.config.provider(&cfg.provider_id), &self.caps)
            .is_valid
    }

    async fn slot(&self, cfg: &CollectionEmbeddingConfig) -> QuarryResult<Arc<ProviderSlot>> {
        let key = ProviderKey::from_config(cfg);
        if let Some(slot) = self.slots.get(&key) {
            return Ok(Arc::clone(slot.value()));
        }

        // Construct and warm off the async thread; blocking client
        // builders and model loads both live there.
        let embedding = cfg.clone();
        let transport = self.config.provider(&cfg.provider_id);
        let caps = self.caps;
        let provider = tokio::task::spawn_blocking(move || {
            let provider = providers::create_provider(&embedding, &transport, &caps)?;
            provider.initialize()?;
            Ok::<_, QuarryError>(provider)
        })
        .await
        .map_err(|e| ProviderError::Unavailable {
            provider: cfg.provider_id.clone(),
            reason: format!("construction task failed: {e}"),
        })??;

        info!(
            provider = %key.provider_id,
            model = %key.model_id,
            dims = key.dimensions,
            "provider constructed and warmed"
        );

        let transport = self.config.provider(&cfg.provider_id);
        let slot = Arc::new(ProviderSlot {
            provider,
            limiter: TokenBucket::from_rpm(transport.requests_per_minute),
            max_retries: transport.max_retries,
            retry_base_ms: transport.retry_base_ms,
        });
        self.slots.insert(key, slot.clone());
        Ok(slot)
    }

    /// Embed one text through the configured provider, with rate limiting
    /// and retry. Falls back to the configured secondary provider when the
    /// primary is exhausted and the collection allows it.
    pub async fn embed(
        &self,
        cfg: &CollectionEmbeddingConfig,
        text: String,
        cancel: &CancelFlag,
    ) -> QuarryResult<Vec<f32>> {
        match self.embed_inner(cfg, vec![text.clone()], cancel).await {
            Ok(mut vectors) => Ok(vectors.pop().unwrap_or_default()),
            Err(primary_err) => {
                let mut vectors = self.try_fallback(cfg, vec![text], cancel, primary_err).await?;
                Ok(vectors.pop().unwrap_or_default())
            }
        }
    }

    /// Embed a batch. Batches past the provider's limit are rejected with
    /// `InvalidInput` before any upstream call.
    pub async fn embed_batch(
        &self,
        cfg: &CollectionEmbeddingConfig,
        texts: Vec<String>,
        cancel: &CancelFlag,
    ) -> QuarryResult<Vec<Vec<f32>>> {
        match self.embed_inner(cfg, texts.clone(), cancel).await {
            Ok(vectors) => Ok(vectors),
            Err(primary_err) => self.try_fallback(cfg, texts, cancel, primary_err).await,
        }
    }

    async fn try_fallback(
        &self,
        cfg: &CollectionEmbeddingConfig,
        texts: Vec<String>,
        cancel: &CancelFlag,
        primary_err: QuarryError,
    ) -> QuarryResult<Vec<Vec<f32>>> {
        // Retries are exhausted. Fallback only engages when the collection
        // permits it; dimensions are identical by construction (the
        // fallback inherits the collection's dimensionality).
        let fallback = match (cfg.allow_fallback, cfg.fallback_provider.as_ref()) {
            (true, Some(fallback)) => fallback,
            _ => return Err(primary_err),
        };
        if matches!(primary_err, QuarryError::Cancelled) {
            return Err(primary_err);
        }
        warn!(
            primary = %cfg.provider_id,
            fallback = %fallback,
            error = %primary_err,
            "primary provider exhausted, engaging fallback"
        );
        let fallback_cfg = CollectionEmbeddingConfig {
            provider_id: fallback.clone(),
            model_id: if fallback == providers::hash_provider::PROVIDER_ID {
                providers::hash_provider::MODEL_ID.to_string()
            } else {
                cfg.model_id.clone()
            },
            allow_fallback: false,
            fallback_provider: None,
            ..cfg.clone()
        };
        self.embed_inner(&fallback_cfg, texts, cancel)
            .await
            .map_err(|fallback_err| {
                debug!(error = %fallback_err, "fallback provider also failed");
                primary_err
            })
    }

    async fn embed_inner(
        &self,
        cfg: &CollectionEmbeddingConfig,
        texts: Vec<String>,
        cancel: &CancelFlag,
    ) -> QuarryResult<Vec<Vec<f32>>> {
        let slot = self.slot(cfg).await?;

        if texts.len() > slot.provider.max_batch_size() {
            return Err(QuarryError::invalid_input(format!(
                "batch of {} exceeds provider limit of {}",
                texts.len(),
                slot.provider.max_batch_size()
            )));
        }

        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(QuarryError::Cancelled);
            }

            // One token per upstream call; issuance is serialized here.
            slot.limiter.acquire().await;

            if cancel.is_cancelled() {
                return Err(QuarryError::Cancelled);
            }

            let provider = slot.provider.clone();
            let batch = texts.clone();
            let call = tokio::task::spawn_blocking(move || {
                if batch.len() == 1 {
                    provider.embed(&batch[0]).map(|v| vec![v])
                } else {
                    provider.embed_batch(&batch)
                }
            })
            .await
            .map_err(|e| {
                QuarryError::from(ProviderError::Unavailable {
                    provider: cfg.provider_id.clone(),
                    reason: format!("provider task failed: {e}"),
                })
            })?;

            match call {
                Ok(vectors) => {
                    for vector in &vectors {
                        if vector.len() != cfg.dimensions {
                            return Err(ProviderError::DimensionMismatch {
                                expected: cfg.dimensions,
                                actual: vector.len(),
                            }
                            .into());
                        }
                    }
                    return Ok(vectors);
                }
                Err(error) => {
                    let Some(delay) = (attempt < slot.max_retries)
                        .then(|| retry::retry_delay(&error, attempt, slot.retry_base_ms))
                        .flatten()
                    else {
                        return Err(error);
                    };
                    debug!(
                        provider = %cfg.provider_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retryable provider failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Metrics snapshots for every warmed instance.
    pub fn metrics(&self) -> Vec<(ProviderKey, ProviderMetricsSnapshot)> {
        self.slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().provider.metrics()))
            .collect()
    }

    /// Health probes for every warmed instance.
    pub fn health(&self) -> Vec<(ProviderKey, ProviderHealth)> {
        self.slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().provider.health_check()))
            .collect()
    }

    /// Release every instance. Draining in-flight calls is the caller's
    /// responsibility (the control plane drains before terminating).
    pub fn cleanup(&self) {
        for entry in self.slots.iter() {
            if let Err(e) = entry.value().provider.cleanup() {
                warn!(error = %e, "provider cleanup failed");
            }
        }
        self.slots.clear();
    }
}
