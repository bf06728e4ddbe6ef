//! The embedding pipeline: one façade over text processing, the cache
//! tiers, and the provider pool, used by query-time and ingest-time work.
//!
//! Single calls race the provider against a deadline and never write the
//! cache on timeout. Batch calls shard, bound their concurrency, capture
//! per-item failures without aborting, and keep output order equal to
//! input order.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use quarry_core::cancel::CancelFlag;
use quarry_core::config::defaults::DEFAULT_BATCH_CONCURRENCY;
use quarry_core::config::CollectionEmbeddingConfig;
use quarry_core::errors::{QuarryError, QuarryResult};
use quarry_core::models::{Collection, EmbeddingSource};
use quarry_text::{content_hash, preprocessing_fingerprint, process};

use crate::cache::{CacheCoordinator, CacheKey, CacheTier, CachedEmbedding};
use crate::pool::ProviderPool;

/// One batch entry: caller-chosen id plus the raw text.
#[derive(Debug, Clone)]
pub struct EmbedRequest {
    pub id: String,
    pub text: String,
}

/// Successful embedding with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedOutcome {
    pub vector: Vec<f32>,
    pub source: EmbeddingSource,
    pub processing_time_ms: u64,
    pub provider_id: String,
    pub model_id: String,
    pub content_hash: String,
}

/// A captured per-item failure: stable code plus human message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFailure {
    pub code: String,
    pub message: String,
}

impl From<&QuarryError> for EmbedFailure {
    fn from(err: &QuarryError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// One batch result, in input order.
#[derive(Debug)]
pub struct EmbedResult {
    pub id: String,
    pub outcome: Result<EmbedOutcome, EmbedFailure>,
}

pub type ProgressFn = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

pub struct BatchOptions {
    /// Shard size; defaults to the collection's batch_size.
    pub batch_size: Option<usize>,
    /// Max shards in flight.
    pub concurrency: usize,
    /// Abort the whole batch on the first failure.
    pub fail_fast: bool,
    pub on_progress: Option<ProgressFn>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: None,
            concurrency: DEFAULT_BATCH_CONCURRENCY,
            fail_fast: false,
            on_progress: None,
        }
    }
}

struct Prepared {
    processed: String,
    content_hash: String,
    key: CacheKey,
}

pub struct EmbeddingPipeline {
    cache: Arc<CacheCoordinator>,
    pool: Arc<ProviderPool>,
}

impl EmbeddingPipeline {
    pub fn new(cache: Arc<CacheCoordinator>, pool: Arc<ProviderPool>) -> Self {
        Self { cache, pool }
    }

    pub fn cache(&self) -> &Arc<CacheCoordinator> {
        &self.cache
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    fn prepare(
        cache: &CacheCoordinator,
        cfg: &CollectionEmbeddingConfig,
        text: &str,
    ) -> QuarryResult<Prepared> {
        let processed = process(text, &cfg.text_preprocessing)?;
        let hash = content_hash(&processed.processed, cfg.text_preprocessing.hash_algorithm);
        let fingerprint = preprocessing_fingerprint(&cfg.text_preprocessing);
        let key = CacheKey::compute(
            &hash.hex,
            &cfg.provider_id,
            &cfg.model_id,
            cfg.dimensions,
            &fingerprint,
            cache.salt(),
        );
        Ok(Prepared {
            processed: processed.processed,
            content_hash: hash.tagged(),
            key,
        })
    }

    fn source_for(tier: CacheTier) -> EmbeddingSource {
        match tier {
            CacheTier::Memory => EmbeddingSource::CacheMemory,
            CacheTier::Persistent => EmbeddingSource::CachePersistent,
            CacheTier::Database => EmbeddingSource::CacheDatabase,
        }
    }

    /// Embed a single query text. Cache tiers answer first; a miss goes to
    /// the provider pool under the collection's deadline. On success the
    /// result is written through to all tiers fire-and-forget.
    pub async fn embed_query(
        &self,
        collection: &Collection,
        text: &str,
        cancel: &CancelFlag,
    ) -> QuarryResult<EmbedOutcome> {
        let t0 = Instant::now();
        let cfg = &collection.embedding;

        let prepared = Self::prepare(&self.cache, cfg, text).map_err(|e| {
            warn!(
                collection = %collection.name,
                text_len = text.len(),
                error = %e,
                "query preprocessing failed"
            );
            e
        })?;

        if cfg.cache_enabled {
            if let Some((cached, tier)) = self.cache.get(&prepared.key) {
                debug!(
                    collection = %collection.name,
                    tier = ?tier,
                    "query embedding cache hit"
                );
                return Ok(EmbedOutcome {
                    vector: cached.vector,
                    source: Self::source_for(tier),
                    processing_time_ms: t0.elapsed().as_millis() as u64,
                    provider_id: cached.provider_id,
                    model_id: cached.model_id,
                    content_hash: prepared.content_hash,
                });
            }
        }

        let deadline = std::time::Duration::from_millis(cfg.timeout_ms.max(1));
        let provider_call = self.pool.embed(cfg, prepared.processed.clone(), cancel);
        let vector = match tokio::time::timeout(deadline, provider_call).await {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                warn!(
                    collection = %collection.name,
                    text_len = text.len(),
                    error = %e,
                    "query embedding failed"
                );
                return Err(e);
            }
            Err(_) => {
                // Deadline hit: raise the cooperative cancel toward the
                // in-flight provider call, report Timeout, write nothing.
                cancel.cancel();
                return Err(QuarryError::Timeout {
                    elapsed_ms: t0.elapsed().as_millis() as u64,
                });
            }
        };

        if cfg.cache_enabled {
            let cache = self.cache.clone();
            let key = prepared.key.clone();
            let value = CachedEmbedding {
                vector: vector.clone(),
                provider_id: cfg.provider_id.clone(),
                model_id: cfg.model_id.clone(),
                dimensions: cfg.dimensions,
                tags: vec![collection.name.clone()],
            };
            // Fire-and-forget: cache writes never sit on the response path.
            tokio::task::spawn_blocking(move || cache.put(&key, &value));
        }

        Ok(EmbedOutcome {
            vector,
            source: EmbeddingSource::ProviderFresh,
            processing_time_ms: t0.elapsed().as_millis() as u64,
            provider_id: cfg.provider_id.clone(),
            model_id: cfg.model_id.clone(),
            content_hash: prepared.content_hash,
        })
    }

    /// Embed a batch. Results come back in input order; per-item failures
    /// are captured as entries unless `fail_fast` is set.
    pub async fn embed_batch(
        &self,
        collection: &Collection,
        requests: Vec<EmbedRequest>,
        opts: BatchOptions,
        cancel: &CancelFlag,
    ) -> QuarryResult<Vec<EmbedResult>> {
        let total = requests.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let shard_size = opts
            .batch_size
            .unwrap_or(collection.embedding.batch_size)
            .max(1);

        let mut shards: Vec<Vec<(usize, EmbedRequest)>> = Vec::new();
        for (index, request) in requests.into_iter().enumerate() {
            if index % shard_size == 0 {
                shards.push(Vec::with_capacity(shard_size));
            }
            shards
                .last_mut()
                .expect("shard exists after push")
                .push((index, request));
        }

        let semaphore = Arc::new(Semaphore::new(opts.concurrency.max(1)));
        let mut join_set = JoinSet::new();
        for shard in shards {
            let permit_source = semaphore.clone();
            let cache = self.cache.clone();
            let pool = self.pool.clone();
            let collection = collection.clone();
            let cancel = cancel.clone();
            let fail_fast = opts.fail_fast;
            join_set.spawn(async move {
                let _permit = permit_source
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                run_shard(cache, pool, collection, shard, cancel, fail_fast).await
            });
        }

        let mut entries: Vec<Option<EmbedResult>> = Vec::new();
        entries.resize_with(total, || None);
        let mut completed = 0usize;

        while let Some(joined) = join_set.join_next().await {
            let (shard_entries, hard_failure) = joined.map_err(|e| {
                QuarryError::invalid_input(format!("batch shard task failed: {e}"))
            })?;

            if let Some(error) = hard_failure {
                cancel.cancel();
                join_set.abort_all();
                return Err(error);
            }

            completed += shard_entries.len();
            let last_label = shard_entries
                .last()
                .map(|(_, result)| result.id.clone())
                .unwrap_or_default();
            for (index, result) in shard_entries {
                entries[index] = Some(result);
            }
            if let Some(progress) = &opts.on_progress {
                progress(completed, total, &last_label);
            }
        }

        Ok(entries
            .into_iter()
            .map(|entry| entry.expect("every index filled by its shard"))
            .collect())
    }

    /// Pre-fill the cache for a set of queries. Runs serially at the back
    /// of the line; failures are logged, never surfaced.
    pub async fn warm_cache(&self, collection: &Collection, queries: &[String]) {
        for query in queries {
            if let Err(e) = self.embed_query(collection, query, &CancelFlag::new()).await {
                debug!(
                    collection = %collection.name,
                    error = %e,
                    "cache warm entry skipped"
                );
            }
        }
    }
}

/// Process one shard: cache lookups first, then a single provider batch
/// call for the misses. Returns `(global_index, result)` pairs plus an
/// optional hard failure (populated only under fail_fast).
async fn run_shard(
    cache: Arc<CacheCoordinator>,
    pool: Arc<ProviderPool>,
    collection: Collection,
    shard: Vec<(usize, EmbedRequest)>,
    cancel: CancelFlag,
    fail_fast: bool,
) -> (Vec<(usize, EmbedResult)>, Option<QuarryError>) {
    let cfg = &collection.embedding;
    let mut results: Vec<(usize, EmbedResult)> = Vec::with_capacity(shard.len());
    let mut pending: Vec<(usize, String, Prepared)> = Vec::new();

    for (index, request) in shard {
        if cancel.is_cancelled() {
            results.push((
                index,
                EmbedResult {
                    id: request.id,
                    outcome: Err(EmbedFailure::from(&QuarryError::Cancelled)),
                },
            ));
            continue;
        }
        match EmbeddingPipeline::prepare(&cache, cfg, &request.text) {
            Ok(prepared) => {
                if cfg.cache_enabled {
                    if let Some((cached, tier)) = cache.get(&prepared.key) {
                        results.push((
                            index,
                            EmbedResult {
                                id: request.id,
                                outcome: Ok(EmbedOutcome {
                                    vector: cached.vector,
                                    source: EmbeddingPipeline::source_for(tier),
                                    processing_time_ms: 0,
                                    provider_id: cached.provider_id,
                                    model_id: cached.model_id,
                                    content_hash: prepared.content_hash,
                                }),
                            },
                        ));
                        continue;
                    }
                }
                pending.push((index, request.id, prepared));
            }
            Err(e) => {
                let failure = EmbedFailure::from(&e);
                results.push((
                    index,
                    EmbedResult {
                        id: request.id,
                        outcome: Err(failure),
                    },
                ));
                if fail_fast {
                    return (results, Some(e));
                }
            }
        }
    }

    if pending.is_empty() {
        return (results, None);
    }

    let t0 = Instant::now();
    let texts: Vec<String> = pending.iter().map(|(_, _, p)| p.processed.clone()).collect();
    let deadline = std::time::Duration::from_millis(cfg.timeout_ms.max(1));
    let call = tokio::time::timeout(deadline, pool.embed_batch(cfg, texts, &cancel)).await;

    match call {
        Ok(Ok(vectors)) => {
            let elapsed_ms = t0.elapsed().as_millis() as u64;
            let mut writes: Vec<(CacheKey, CachedEmbedding)> = Vec::new();
            for ((index, id, prepared), vector) in pending.into_iter().zip(vectors) {
                if cfg.cache_enabled {
                    writes.push((
                        prepared.key.clone(),
                        CachedEmbedding {
                            vector: vector.clone(),
                            provider_id: cfg.provider_id.clone(),
                            model_id: cfg.model_id.clone(),
                            dimensions: cfg.dimensions,
                            tags: vec![collection.name.clone()],
                        },
                    ));
                }
                results.push((
                    index,
                    EmbedResult {
                        id,
                        outcome: Ok(EmbedOutcome {
                            vector,
                            source: EmbeddingSource::ProviderFresh,
                            processing_time_ms: elapsed_ms,
                            provider_id: cfg.provider_id.clone(),
                            model_id: cfg.model_id.clone(),
                            content_hash: prepared.content_hash,
                        }),
                    },
                ));
            }
            if !writes.is_empty() {
                let cache = cache.clone();
                tokio::task::spawn_blocking(move || {
                    for (key, value) in &writes {
                        cache.put(key, value);
                    }
                });
            }
            (results, None)
        }
        Ok(Err(error)) => {
            let failure = EmbedFailure::from(&error);
            for (index, id, _) in pending {
                results.push((
                    index,
                    EmbedResult {
                        id,
                        outcome: Err(failure.clone()),
                    },
                ));
            }
            (results, fail_fast.then_some(error))
        }
        Err(_) => {
            cancel.cancel();
            let error = QuarryError::Timeout {
                elapsed_ms: t0.elapsed().as_millis() as u64,
            };
            let failure = EmbedFailure::from(&error);
            for (index, id, _) in pending {
                results.push((
                    index,
                    EmbedResult {
                        id,
                        outcome: Err(failure.clone()),
                    },
                ));
            }
            (results, fail_fast.then_some(error))
        }
    }
}
