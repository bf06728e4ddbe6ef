//! The execution domain: one runtime thread owning storage, cache,
//! providers, pipeline, queue worker, and the search executor. Requests
//! arrive over the channel, run as tasks, and answer through the pending
//! table; periodic maintenance (cache trim, stale-reservation sweep) runs
//! beside them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use quarry_core::cancel::CancelFlag;
use quarry_core::config::QuarryConfig;
use quarry_core::errors::{QuarryError, QuarryResult};
use quarry_core::models::{Collection, Document, EnvironmentCaps, NewQueueItem};
use quarry_core::traits::DocumentStorage;
use quarry_embeddings::{
    BatchOptions, CacheCoordinator, EmbedRequest, EmbeddingPipeline, ProviderPool,
};
use quarry_queue::QueueWorker;
use quarry_retrieval::{SearchExecutor, SearchOptions};
use quarry_storage::StorageEngine;
use quarry_text::{content_hash, process};

use crate::handle::{deliver, EngineHandle, Envelope, PendingTable};
use crate::message::{LogMessage, Method, Response, WireDocument, WireError, WireSearchOptions};
use crate::metrics::ControlMetrics;

/// Engine construction options.
#[derive(Default)]
pub struct EngineOptions {
    /// Database file; `None` runs fully in memory.
    pub db_path: Option<PathBuf>,
    pub config: QuarryConfig,
    pub caps: EnvironmentCaps,
}

struct EngineInner {
    storage: Arc<StorageEngine>,
    cache: Arc<CacheCoordinator>,
    pool: Arc<ProviderPool>,
    pipeline: Arc<EmbeddingPipeline>,
    worker: QueueWorker,
    executor: SearchExecutor,
    metrics: Arc<ControlMetrics>,
    pending: Arc<PendingTable>,
    queue_visibility_secs: u64,
}

/// Engine entry point: builds the component stack and spawns the runtime
/// thread. The returned handle is the only way in.
pub struct Engine;

impl Engine {
    pub fn start(opts: EngineOptions) -> QuarryResult<EngineHandle> {
        init_tracing(&opts.config.control.log_level);

        let storage = Arc::new(match &opts.db_path {
            Some(path) => StorageEngine::open(path)?,
            None => StorageEngine::open_in_memory()?,
        });
        let cache = Arc::new(CacheCoordinator::new(
            opts.config.cache.clone(),
            storage.db_path(),
            Some(storage.clone() as Arc<dyn DocumentStorage>),
        ));
        let pool = Arc::new(ProviderPool::new(opts.config.clone(), opts.caps));
        let pipeline = Arc::new(EmbeddingPipeline::new(cache.clone(), pool.clone()));
        let worker = QueueWorker::new(
            storage.clone() as Arc<dyn DocumentStorage>,
            pipeline.clone(),
            opts.config.queue.clone(),
        );
        let executor = SearchExecutor::new(
            storage.clone() as Arc<dyn DocumentStorage>,
            Some(pipeline.clone()),
            opts.config.retrieval.clone(),
        );

        let pending: Arc<PendingTable> = Arc::new(DashMap::new());
        let metrics = Arc::new(ControlMetrics::default());
        let inner = Arc::new(EngineInner {
            storage,
            cache,
            pool,
            pipeline,
            worker,
            executor,
            metrics: metrics.clone(),
            pending: pending.clone(),
            queue_visibility_secs: opts.config.queue.visibility_timeout_secs,
        });

        let (tx, rx) = mpsc::unbounded_channel::<Envelope>();
        let cleanup_interval = Duration::from_secs(opts.config.cache.cleanup_interval_secs.max(1));

        let loop_pending = pending.clone();
        std::thread::Builder::new()
            .name("quarry-engine".to_string())
            .spawn(move || run_engine(inner, rx, loop_pending, cleanup_interval))
            .map_err(|e| {
                QuarryError::Channel(quarry_core::errors::ChannelError::ChannelError {
                    reason: format!("engine thread spawn failed: {e}"),
                })
            })?;

        Ok(EngineHandle::new(
            tx,
            pending,
            opts.config.control.clone(),
            metrics,
        ))
    }
}

/// Dispatch a multiplexed log message to the caller's logger (the ambient
/// tracing subscriber) without touching response correlation.
fn forward_log(log: LogMessage) {
    match log.level.as_str() {
        "debug" => debug!(target: "quarry::engine", "{}", log.message),
        "warn" => warn!(target: "quarry::engine", "{}", log.message),
        "error" => error!(target: "quarry::engine", "{}", log.message),
        _ => info!(target: "quarry::engine", "{}", log.message),
    }
}

fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

fn run_engine(
    inner: Arc<EngineInner>,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    pending: Arc<PendingTable>,
    cleanup_interval: Duration,
) {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "engine runtime build failed");
            return;
        }
    };

    runtime.block_on(async move {
        // Periodic maintenance: expired cache entries and stale queue
        // reservations.
        let maintenance = inner.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                maintenance.cache.trim_expired();
                if let Err(e) = maintenance
                    .storage
                    .sweep_stale(maintenance.queue_visibility_secs, chrono::Utc::now())
                {
                    warn!(error = %e, "stale reservation sweep failed");
                }
                debug!("maintenance pass complete");
            }
        });

        info!("engine runtime ready");
        while let Some(envelope) = rx.recv().await {
            let inner = inner.clone();
            let pending = pending.clone();
            tokio::spawn(async move {
                let Envelope { id, method, cancel } = envelope;
                let name = method.name();
                let result = dispatch(&inner, method, &cancel).await;
                let response = match result {
                    Ok(value) => Response::success(id, value),
                    Err(ref e) => {
                        // Failures also travel as log messages beside the
                        // response, without touching correlation.
                        forward_log(LogMessage {
                            level: "warn".to_string(),
                            message: format!("{name} (id {id}) failed: {e}"),
                        });
                        Response::failure(id, WireError::from(e))
                    }
                };
                deliver(&pending, response);
            });
        }
        info!("engine channel drained; runtime stopping");
    });
}

impl EngineInner {
    fn collection(&self, name: &str) -> QuarryResult<Collection> {
        self.storage.get_collection(name)?.ok_or_else(|| {
            quarry_core::errors::StorageError::CollectionNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Queue embedding work for a freshly written document when the
    /// collection auto-generates and the content actually changed.
    fn maybe_enqueue(&self, collection: &Collection, doc: &Document) -> QuarryResult<bool> {
        if !collection.embedding.auto_generate
            || collection.embedding_status != quarry_core::models::EmbeddingStatus::Enabled
        {
            return Ok(false);
        }
        let text = doc.embeddable_text();
        if text.is_empty() {
            return Ok(false);
        }

        // Unchanged content keeps its current embedding.
        if let Ok(processed) = process(text, &collection.embedding.text_preprocessing) {
            let hash = content_hash(
                &processed.processed,
                collection.embedding.text_preprocessing.hash_algorithm,
            )
            .tagged();
            if let Some(existing) = self.storage.get_embedding(&collection.name, &doc.id)? {
                if existing.content_hash == hash {
                    return Ok(false);
                }
            }
        }

        self.storage.enqueue(&NewQueueItem {
            collection: collection.name.clone(),
            document_id: doc.id.clone(),
            text: text.to_string(),
            priority: 0,
        })?;
        Ok(true)
    }
}

fn to_document(wire: WireDocument) -> QuarryResult<Document> {
    let metadata = match wire.metadata {
        serde_json::Value::Null => json!({}),
        other => other,
    };
    Document::new(
        &wire.collection,
        &wire.id.into_string(),
        wire.title,
        wire.content,
        metadata,
    )
}

fn to_search_options(wire: WireSearchOptions) -> SearchOptions {
    SearchOptions {
        mode: wire.mode,
        limit: wire.limit,
        offset: wire.offset,
        filters: wire.filters,
        rerank: wire.rerank,
        diversify: wire.diversify,
    }
}

async fn dispatch(
    inner: &EngineInner,
    method: Method,
    cancel: &CancelFlag,
) -> QuarryResult<serde_json::Value> {
    match method {
        Method::SearchText {
            collection,
            query,
            options,
        } => {
            let response = inner
                .executor
                .search_text(&collection, &query, &to_search_options(options), cancel)
                .await?;
            Ok(serde_json::to_value(response).expect("response serializes"))
        }

        Method::SearchGlobal { query, options } => {
            let response = inner
                .executor
                .search_global(&query, &to_search_options(options), cancel)
                .await?;
            Ok(serde_json::to_value(response).expect("response serializes"))
        }

        Method::EmbedQuery { collection, text } => {
            let collection = inner.collection(&collection)?;
            let outcome = inner.pipeline.embed_query(&collection, &text, cancel).await?;
            Ok(json!({
                "vector": outcome.vector,
                "source": outcome.source,
                "processing_time_ms": outcome.processing_time_ms,
                "provider_id": outcome.provider_id,
                "model_id": outcome.model_id,
                "content_hash": outcome.content_hash,
            }))
        }

        Method::EmbedBatch {
            collection,
            requests,
            fail_fast,
        } => {
            let collection = inner.collection(&collection)?;
            let requests: Vec<EmbedRequest> = requests
                .into_iter()
                .map(|r| EmbedRequest {
                    id: r.id.into_string(),
                    text: r.text,
                })
                .collect();
            let results = inner
                .pipeline
                .embed_batch(
                    &collection,
                    requests,
                    BatchOptions {
                        fail_fast,
                        ..BatchOptions::default()
                    },
                    cancel,
                )
                .await?;
            let entries: Vec<serde_json::Value> = results
                .into_iter()
                .map(|entry| match entry.outcome {
                    Ok(outcome) => json!({
                        "id": entry.id,
                        "ok": true,
                        "vector": outcome.vector,
                        "source": outcome.source,
                    }),
                    Err(failure) => json!({
                        "id": entry.id,
                        "ok": false,
                        "error": failure,
                    }),
                })
                .collect();
            Ok(json!({ "results": entries }))
        }

        Method::WarmCache {
            collection,
            queries,
        } => {
            let collection = inner.collection(&collection)?;
            inner.pipeline.warm_cache(&collection, &queries).await;
            Ok(json!({ "warmed": queries.len() }))
        }

        Method::CreateCollection { name, embedding } => {
            let collection = Collection::new(&name, embedding)?;
            inner.storage.create_collection(&collection)?;
            Ok(serde_json::to_value(&collection).expect("collection serializes"))
        }

        Method::ListCollections => {
            let collections = inner.storage.list_collections()?;
            Ok(serde_json::to_value(&collections).expect("collections serialize"))
        }

        Method::InsertDocument { document } => {
            let doc = to_document(document)?;
            let collection = inner.collection(&doc.collection)?;
            inner.storage.insert_document(&doc)?;
            let queued = inner.maybe_enqueue(&collection, &doc)?;
            Ok(json!({ "inserted": 1, "queued": queued }))
        }

        Method::InsertDocuments { documents } => {
            let docs: Vec<Document> = documents
                .into_iter()
                .map(to_document)
                .collect::<QuarryResult<_>>()?;
            let report = inner.storage.insert_documents(&docs)?;
            let mut queued = 0usize;
            for doc in &docs {
                let collection = inner.collection(&doc.collection)?;
                if inner.maybe_enqueue(&collection, doc)? {
                    queued += 1;
                }
            }
            Ok(json!({
                "inserted": report.inserted,
                "fts_synced": report.fts_synced,
                "queued": queued,
                "warnings": report.warnings,
            }))
        }

        Method::GetDocument { collection, id } => {
            let doc = inner
                .storage
                .get_document(&collection, &id.into_string())?;
            Ok(serde_json::to_value(&doc).expect("document serializes"))
        }

        Method::DeleteDocument { collection, id } => {
            let removed = inner
                .storage
                .delete_document(&collection, &id.into_string())?;
            Ok(json!({ "deleted": removed }))
        }

        Method::Enqueue {
            collection,
            document_id,
            text,
            priority,
        } => {
            let id = inner.storage.enqueue(&NewQueueItem {
                collection,
                document_id: document_id.into_string(),
                text,
                priority,
            })?;
            Ok(json!({ "queued": id }))
        }

        Method::QueueStatus { collection } => {
            let report = inner
                .storage
                .queue_status(collection.as_deref(), chrono::Utc::now())?;
            Ok(serde_json::to_value(&report).expect("report serializes"))
        }

        Method::ProcessQueue => {
            let report = inner.worker.run_until_idle(cancel).await?;
            Ok(json!({
                "swept": report.swept,
                "reserved": report.reserved,
                "completed": report.completed,
                "retried": report.retried,
                "failed": report.failed,
            }))
        }

        Method::CacheStats => {
            Ok(serde_json::to_value(inner.cache.stats()).expect("stats serialize"))
        }

        Method::CacheInvalidate { pattern } => {
            let removed = inner.cache.invalidate(&pattern)?;
            Ok(json!({ "invalidated": removed }))
        }

        Method::ClearCollection { collection } => {
            // Cache entries are tagged with their collection name; the
            // document wipe runs inside one storage transaction.
            let invalidated = inner.cache.invalidate(&format!("tag:{collection}"))?;
            let deleted = inner.storage.clear_documents(&collection)?;
            Ok(json!({ "deleted": deleted, "cache_invalidated": invalidated }))
        }

        Method::Metrics => {
            let control = inner.metrics.snapshot(inner.pending.len());
            let providers: Vec<serde_json::Value> = inner
                .pool
                .metrics()
                .into_iter()
                .map(|(key, snapshot)| {
                    json!({
                        "provider": key.provider_id,
                        "model": key.model_id,
                        "dimensions": key.dimensions,
                        "metrics": snapshot,
                    })
                })
                .collect();
            Ok(json!({
                "control": control,
                "cache": inner.cache.stats(),
                "providers": providers,
            }))
        }

        Method::Health => {
            let collections = inner.storage.list_collections()?;
            // Health probes may touch the network; keep them off the
            // async workers.
            let pool = inner.pool.clone();
            let probes = tokio::task::spawn_blocking(move || pool.health())
                .await
                .unwrap_or_default();
            let providers: Vec<serde_json::Value> = probes
                .into_iter()
                .map(|(key, health)| {
                    json!({
                        "provider": key.provider_id,
                        "model": key.model_id,
                        "healthy": health.healthy,
                        "status": health.status,
                    })
                })
                .collect();
            let queue = inner.storage.queue_status(None, chrono::Utc::now())?;
            Ok(json!({
                "healthy": true,
                "collections": collections.len(),
                "providers": providers,
                "queue": queue,
            }))
        }
    }
}
