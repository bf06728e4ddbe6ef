use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::query_analysis::SearchStrategy;
use crate::config::defaults;

/// How per-side candidate lists are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// Reciprocal rank fusion; robust to heterogeneous score ranges.
    #[default]
    Rrf,
    WeightedSum,
    Max,
    NormalizedWeighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    #[default]
    None,
    MinMax,
    ZScore,
    Sigmoid,
}

/// Fusion weights. Missing sides contribute zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanWeights {
    pub fts: f64,
    pub vector: f64,
    pub exact_match: f64,
    pub phrase: f64,
    pub proximity: f64,
    pub freshness: f64,
    pub popularity: f64,
}

impl Default for PlanWeights {
    fn default() -> Self {
        Self {
            fts: 0.5,
            vector: 0.5,
            exact_match: 0.0,
            phrase: 0.0,
            proximity: 0.0,
            freshness: 0.0,
            popularity: 0.0,
        }
    }
}

/// Why the planner chose what it chose: the rule that fired plus notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanTrail {
    pub rule: String,
    pub notes: Vec<String>,
}

/// A complete, executable search plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub primary_strategy: SearchStrategy,
    /// Tried in order when the primary cannot run.
    pub fallback_strategies: Vec<SearchStrategy>,
    pub fusion_method: FusionMethod,
    pub weights: PlanWeights,
    pub score_normalization: ScoreNormalization,
    /// Equality filters over document metadata, applied after fusion.
    pub filters: BTreeMap<String, serde_json::Value>,
    pub limit: usize,
    pub offset: usize,
    pub performance_budget_ms: u64,
    /// FTS5 match expression derived from the query.
    pub match_expression: String,
    pub trail: PlanTrail,
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self {
            primary_strategy: SearchStrategy::Keyword,
            fallback_strategies: Vec::new(),
            fusion_method: FusionMethod::default(),
            weights: PlanWeights::default(),
            score_normalization: ScoreNormalization::default(),
            filters: BTreeMap::new(),
            limit: defaults::DEFAULT_SEARCH_LIMIT,
            offset: 0,
            performance_budget_ms: defaults::DEFAULT_PERFORMANCE_BUDGET_MS,
            match_expression: String::new(),
            trail: PlanTrail::default(),
        }
    }
}
