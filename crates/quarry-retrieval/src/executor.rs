//! Search execution: plan → (optional) query embedding → side-by-side
//! keyword and vector lookups → fusion → post-processing.
//!
//! Degradation rules: a failed vector side falls back to keyword with a
//! warning; only when no side can answer does the executor raise an error.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use quarry_core::cancel::CancelFlag;
use quarry_core::config::RetrievalConfig;
use quarry_core::errors::{QuarryResult, SearchError, StorageError};
use quarry_core::models::{
    CollectionInfo, Document, ExecutionPlan, FtsHit, KnnHit, SearchResponse, SearchResult,
    SearchStrategy, StageTimings,
};
use quarry_core::traits::DocumentStorage;
use quarry_embeddings::EmbeddingPipeline;

use crate::analysis::QueryAnalyzer;
use crate::diversity;
use crate::fusion::{self, FusedCandidate};
use crate::planner::{CollectionCaps, Planner};
use crate::rerank;
use crate::snippet;

/// Per-call search options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Force a strategy instead of letting the planner pick.
    pub mode: Option<SearchStrategy>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Metadata equality filters.
    pub filters: BTreeMap<String, serde_json::Value>,
    pub rerank: Option<bool>,
    pub diversify: Option<bool>,
}

pub struct SearchExecutor {
    storage: Arc<dyn DocumentStorage>,
    pipeline: Option<Arc<EmbeddingPipeline>>,
    analyzer: QueryAnalyzer,
    planner: Planner,
    cfg: RetrievalConfig,
}

impl SearchExecutor {
    pub fn new(
        storage: Arc<dyn DocumentStorage>,
        pipeline: Option<Arc<EmbeddingPipeline>>,
        cfg: RetrievalConfig,
    ) -> Self {
        Self {
            storage,
            pipeline,
            analyzer: QueryAnalyzer::new(),
            planner: Planner::new(cfg.clone()),
            cfg,
        }
    }

    /// Search one collection.
    pub async fn search_text(
        &self,
        collection_name: &str,
        query: &str,
        opts: &SearchOptions,
        cancel: &CancelFlag,
    ) -> QuarryResult<SearchResponse> {
        let t_total = Instant::now();
        let mut timings = StageTimings::default();
        let mut warnings = Vec::new();

        // Stage: analysis.
        let t0 = Instant::now();
        let analysis = self.analyzer.analyze(query);
        timings.analysis_ms = t0.elapsed().as_millis() as u64;

        // Stage: planning.
        let t0 = Instant::now();
        let collection = self
            .storage
            .get_collection(collection_name)?
            .ok_or_else(|| StorageError::CollectionNotFound {
                name: collection_name.to_string(),
            })?;
        let caps = CollectionCaps {
            has_fts: true,
            has_vector: self.storage.has_vector_index(collection_name)?,
            embeddings_enabled: matches!(
                collection.embedding_status,
                quarry_core::models::EmbeddingStatus::Enabled
            ),
            provider_available: self
                .pipeline
                .as_ref()
                .is_some_and(|p| p.pool().is_available(&collection.embedding)),
        };
        let limit = opts.limit.unwrap_or(self.cfg.default_limit);
        let mut plan =
            self.planner
                .plan(&analysis, &caps, limit, opts.offset, opts.filters.clone());
        if let Some(mode) = opts.mode {
            plan.trail.notes.push(format!(
                "strategy {} forced by caller (planner chose {})",
                mode.as_str(),
                plan.primary_strategy.as_str()
            ));
            plan.primary_strategy = mode;
        }
        timings.planning_ms = t0.elapsed().as_millis() as u64;

        if !caps.has_vector {
            warnings.push(format!(
                "vector index absent for collection {collection_name}; keyword side only"
            ));
        }

        // A zero limit never touches providers or storage.
        if limit == 0 {
            timings.total_ms = t_total.elapsed().as_millis() as u64;
            return Ok(SearchResponse {
                results: Vec::new(),
                strategy: plan.primary_strategy,
                warnings,
                used_fts: false,
                used_vector: false,
                timings,
            });
        }

        debug!(
            collection = collection_name,
            strategy = plan.primary_strategy.as_str(),
            rule = %plan.trail.rule,
            "plan ready"
        );

        // Stage: query embedding (vector and hybrid plans only).
        let t0 = Instant::now();
        let mut strategy = plan.primary_strategy;
        let mut query_vector: Option<Vec<f32>> = None;
        if strategy != SearchStrategy::Keyword {
            match &self.pipeline {
                Some(pipeline) if caps.embeddings_enabled => {
                    match pipeline.embed_query(&collection, query, cancel).await {
                        Ok(outcome) => query_vector = Some(outcome.vector),
                        Err(e) => {
                            warn!(error = %e, "query embedding failed, degrading to keyword");
                            warnings.push(format!(
                                "query embedding unavailable ({}); fell back to keyword",
                                e.code()
                            ));
                        }
                    }
                }
                _ => {
                    warnings.push(
                        "embedding pipeline unavailable; fell back to keyword".to_string(),
                    );
                }
            }
            if query_vector.is_none() {
                if !caps.has_fts {
                    return Err(SearchError::NoStrategy {
                        collection: collection_name.to_string(),
                    }
                    .into());
                }
                strategy = SearchStrategy::Keyword;
            }
        }
        timings.embedding_ms = t0.elapsed().as_millis() as u64;

        if cancel.is_cancelled() {
            return Err(quarry_core::errors::QuarryError::Cancelled);
        }

        // Stage: execution. Keyword and vector sides run side by side on
        // the blocking pool; reads are concurrent under the read pool.
        let t0 = Instant::now();
        let fetch_limit = (limit + opts.offset).max(1) * self.cfg.overscan.max(1);
        let run_fts = strategy != SearchStrategy::Vector;
        let run_knn = strategy != SearchStrategy::Keyword && query_vector.is_some();

        let storage = self.storage.clone();
        let match_expr = plan.match_expression.clone();
        let knn_vector = query_vector.clone();
        let collection_owned = collection_name.to_string();
        let (fts_side, knn_side) = tokio::task::spawn_blocking(move || {
            rayon::join(
                || -> Option<QuarryResult<Vec<FtsHit>>> {
                    run_fts
                        .then(|| storage.search_fts(&collection_owned, &match_expr, fetch_limit))
                },
                || -> Option<QuarryResult<Vec<KnnHit>>> {
                    match (run_knn, &knn_vector) {
                        (true, Some(vector)) => {
                            Some(storage.search_knn(&collection_owned, vector, fetch_limit))
                        }
                        _ => None,
                    }
                },
            )
        })
        .await
        .map_err(|e| SearchError::NoStrategy {
            collection: format!("{collection_name}: execution task failed: {e}"),
        })?;

        let (fts_hits, knn_hits) =
            resolve_sides(collection_name, fts_side, knn_side, &mut warnings)?;
        let used_fts = fts_hits.is_some();
        let used_vector = knn_hits.is_some();
        timings.execution_ms = t0.elapsed().as_millis() as u64;

        // Stage: fusion and post-processing.
        let t0 = Instant::now();
        let fused = fusion::fuse(
            fts_hits.as_deref(),
            knn_hits.as_deref(),
            plan.fusion_method,
            &plan.weights,
            plan.score_normalization,
            self.planner.rrf_k(),
        );

        let mut results = self.hydrate(collection_name, fused, &plan)?;
        self.post_process(&mut results, query, &analysis.normalized, opts, &plan);
        timings.fusion_ms = t0.elapsed().as_millis() as u64;
        timings.total_ms = t_total.elapsed().as_millis() as u64;

        if timings.total_ms > plan.performance_budget_ms {
            warnings.push(format!(
                "search took {}ms, over the {}ms budget",
                timings.total_ms, plan.performance_budget_ms
            ));
        }

        info!(
            collection = collection_name,
            strategy = strategy.as_str(),
            results = results.len(),
            total_ms = timings.total_ms,
            "search complete"
        );

        Ok(SearchResponse {
            results,
            strategy,
            warnings,
            used_fts,
            used_vector,
            timings,
        })
    }

    /// Search every collection and merge by the same fusion ordering.
    /// Ties break deterministically by `(collection, id)`.
    pub async fn search_global(
        &self,
        query: &str,
        opts: &SearchOptions,
        cancel: &CancelFlag,
    ) -> QuarryResult<SearchResponse> {
        let t_total = Instant::now();
        let limit = opts.limit.unwrap_or(self.cfg.default_limit);
        let collections = self.storage.list_collections()?;

        let mut merged: Vec<SearchResult> = Vec::new();
        let mut warnings = Vec::new();
        let mut used_fts = false;
        let mut used_vector = false;

        let per_collection = SearchOptions {
            limit: Some(limit + opts.offset),
            offset: 0,
            ..opts.clone()
        };

        for collection in &collections {
            if cancel.is_cancelled() {
                return Err(quarry_core::errors::QuarryError::Cancelled);
            }
            match self
                .search_text(&collection.name, query, &per_collection, cancel)
                .await
            {
                Ok(mut response) => {
                    let info = CollectionInfo {
                        provider_id: collection.embedding.provider_id.clone(),
                        document_count: self.storage.count_documents(&collection.name)?,
                    };
                    for result in &mut response.results {
                        result.collection_info = Some(info.clone());
                    }
                    used_fts |= response.used_fts;
                    used_vector |= response.used_vector;
                    warnings.extend(
                        response
                            .warnings
                            .into_iter()
                            .map(|w| format!("{}: {w}", collection.name)),
                    );
                    merged.extend(response.results);
                }
                Err(e) => {
                    warn!(collection = %collection.name, error = %e, "global search leg failed");
                    warnings.push(format!("{}: search failed ({})", collection.name, e.code()));
                }
            }
        }

        merged.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.collection.cmp(&b.collection))
                .then_with(|| a.id.cmp(&b.id))
        });
        let results: Vec<SearchResult> = merged
            .into_iter()
            .skip(opts.offset)
            .take(limit)
            .collect();

        let mut timings = StageTimings::default();
        timings.total_ms = t_total.elapsed().as_millis() as u64;

        Ok(SearchResponse {
            results,
            strategy: if used_vector {
                SearchStrategy::Hybrid
            } else {
                SearchStrategy::Keyword
            },
            warnings,
            used_fts,
            used_vector,
            timings,
        })
    }

    /// Join fused candidates with their documents, apply metadata filters
    /// and configured boosts, and restore the final ordering.
    fn hydrate(
        &self,
        collection_name: &str,
        fused: Vec<FusedCandidate>,
        plan: &ExecutionPlan,
    ) -> QuarryResult<Vec<SearchResult>> {
        let now = Utc::now();
        let mut results = Vec::with_capacity(fused.len());

        for candidate in fused {
            let Some(doc) = self.storage.get_document(collection_name, &candidate.doc_id)? else {
                // FTS or vector row outlived its document; skip it.
                continue;
            };
            if !matches_filters(&doc, &plan.filters) {
                continue;
            }

            let mut combined = candidate.combined;
            if plan.weights.freshness > 0.0 {
                let age_days = (now - doc.created_at).num_days().max(0) as f64;
                combined += plan.weights.freshness / (1.0 + age_days);
            }
            if plan.weights.popularity > 0.0 {
                if let Some(popularity) = doc.metadata.get("popularity").and_then(|v| v.as_f64()) {
                    combined += plan.weights.popularity * popularity;
                }
            }

            results.push(SearchResult {
                collection: collection_name.to_string(),
                id: doc.id,
                title: doc.title,
                content: doc.content,
                metadata: doc.metadata,
                combined_score: combined,
                fts_score: candidate.fts_score,
                vector_score: candidate.vector_score,
                fts_rank: candidate.fts_rank,
                vector_rank: candidate.vector_rank,
                snippet: None,
                collection_info: None,
            });
        }

        // Boosts may have reordered; stable sort, ties by id.
        results.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(results)
    }

    fn post_process(
        &self,
        results: &mut Vec<SearchResult>,
        query: &str,
        normalized_query: &str,
        opts: &SearchOptions,
        plan: &ExecutionPlan,
    ) {
        if opts.rerank.unwrap_or(self.cfg.rerank_enabled) {
            let terms = self.analyzer.content_terms(normalized_query);
            rerank::rerank(results, query, &terms, self.cfg.rerank_top_k);
        }
        if opts.diversify.unwrap_or(self.cfg.diversity_enabled) {
            diversity::diversify(results, self.cfg.diversity_lambda);
        }

        // Pagination happens after fusion and reordering passes.
        if plan.offset > 0 {
            *results = results.split_off(plan.offset.min(results.len()));
        }
        results.truncate(plan.limit);

        let terms = self.analyzer.content_terms(normalized_query);
        for result in results.iter_mut() {
            let source = result
                .content
                .as_deref()
                .or(result.title.as_deref())
                .unwrap_or("");
            result.snippet = snippet::generate(source, &terms, self.cfg.snippet_max_chars);
        }
    }
}

/// Collapse the two optional side outcomes, degrading on single-side
/// failure and erroring only when nothing answered.
fn resolve_sides(
    collection: &str,
    fts_side: Option<QuarryResult<Vec<FtsHit>>>,
    knn_side: Option<QuarryResult<Vec<KnnHit>>>,
    warnings: &mut Vec<String>,
) -> QuarryResult<(Option<Vec<FtsHit>>, Option<Vec<KnnHit>>)> {
    match (fts_side, knn_side) {
        (Some(Err(fts_err)), Some(Err(knn_err))) => Err(SearchError::BothSidesFailed {
            keyword: fts_err.to_string(),
            vector: knn_err.to_string(),
        }
        .into()),
        (Some(Err(fts_err)), knn) => {
            let knn = knn.transpose()?;
            if knn.is_none() {
                return Err(fts_err);
            }
            warnings.push(format!(
                "keyword side failed for {collection}; returning vector results only"
            ));
            Ok((None, knn))
        }
        (fts, Some(Err(knn_err))) => {
            let fts = fts.transpose()?;
            if fts.is_none() {
                return Err(knn_err);
            }
            warnings.push(format!(
                "vector side failed for {collection}; returning keyword results only"
            ));
            Ok((fts, None))
        }
        (fts, knn) => Ok((fts.transpose()?, knn.transpose()?)),
    }
}

fn matches_filters(doc: &Document, filters: &BTreeMap<String, serde_json::Value>) -> bool {
    filters
        .iter()
        .all(|(key, expected)| doc.metadata.get(key) == Some(expected))
}
