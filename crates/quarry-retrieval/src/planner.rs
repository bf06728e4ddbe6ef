//! Deterministic execution planning. Ordered rules, first match wins; the
//! fired rule and its inputs are recorded on the plan's debug trail.

use std::collections::BTreeMap;

use quarry_core::config::RetrievalConfig;
use quarry_core::models::{
    ExecutionPlan, FusionMethod, PlanTrail, PlanWeights, QueryAnalysis, QueryIntent,
    ScoreNormalization, SearchStrategy,
};

/// What the target collection can actually execute.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionCaps {
    pub has_fts: bool,
    pub has_vector: bool,
    pub embeddings_enabled: bool,
    pub provider_available: bool,
}

impl CollectionCaps {
    fn vector_side_ready(&self) -> bool {
        self.has_vector && self.embeddings_enabled && self.provider_available
    }
}

pub struct Planner {
    cfg: RetrievalConfig,
}

impl Planner {
    pub fn new(cfg: RetrievalConfig) -> Self {
        Self { cfg }
    }

    pub fn plan(
        &self,
        analysis: &QueryAnalysis,
        caps: &CollectionCaps,
        limit: usize,
        offset: usize,
        filters: BTreeMap<String, serde_json::Value>,
    ) -> ExecutionPlan {
        let operator_bearing =
            analysis.has_quotes || analysis.has_boolean_ops || analysis.has_wildcards;
        let conceptual = !operator_bearing && analysis.word_count <= 5;

        let mut plan = ExecutionPlan {
            limit,
            offset,
            filters,
            performance_budget_ms: self.cfg.performance_budget_ms,
            match_expression: build_match_expression(analysis),
            ..ExecutionPlan::default()
        };

        // Rule 1: operator- or phrase-bearing queries on an FTS-capable
        // collection run keyword-first.
        if operator_bearing && caps.has_fts {
            plan.primary_strategy = SearchStrategy::Keyword;
            if caps.vector_side_ready() {
                plan.fallback_strategies = vec![SearchStrategy::Vector];
            }
            plan.weights = PlanWeights {
                fts: 1.0,
                vector: 0.0,
                ..PlanWeights::default()
            };
            plan.trail = trail("keyword-operators", analysis);
            return plan;
        }

        // Rule 2: short conceptual queries go vector-first when the
        // collection can embed.
        if conceptual && caps.vector_side_ready() {
            plan.primary_strategy = SearchStrategy::Vector;
            if caps.has_fts {
                plan.fallback_strategies = vec![SearchStrategy::Keyword];
            }
            plan.weights = PlanWeights {
                fts: 0.0,
                vector: 1.0,
                ..PlanWeights::default()
            };
            plan.trail = trail("vector-conceptual", analysis);
            return plan;
        }

        // Rule 3: mixed signals with both indexes available fuse.
        if caps.has_fts && caps.vector_side_ready() {
            plan.primary_strategy = SearchStrategy::Hybrid;
            plan.fallback_strategies = vec![SearchStrategy::Keyword];
            plan.weights = hybrid_weights(analysis);
            if analysis.intent == QueryIntent::Question {
                // Homogeneous after normalization: weighted sum favors the
                // semantic side for question-shaped queries.
                plan.fusion_method = FusionMethod::WeightedSum;
                plan.score_normalization = ScoreNormalization::MinMax;
            } else {
                // Heterogeneous score ranges: RRF needs no normalization.
                plan.fusion_method = FusionMethod::Rrf;
                plan.score_normalization = ScoreNormalization::None;
            }
            plan.trail = trail("hybrid-mixed", analysis);
            return plan;
        }

        // Rule 4: no usable vector side; keyword only.
        plan.primary_strategy = SearchStrategy::Keyword;
        plan.weights = PlanWeights {
            fts: 1.0,
            vector: 0.0,
            ..PlanWeights::default()
        };
        plan.trail = trail("keyword-degraded", analysis);
        if !caps.vector_side_ready() {
            plan.trail
                .notes
                .push("vector side unavailable for this collection".to_string());
        }
        plan
    }

    pub fn rrf_k(&self) -> u32 {
        self.cfg.rrf_k
    }
}

/// Boolean ops raise the keyword weight; question-shaped and stop-wordy
/// queries raise the vector weight.
fn hybrid_weights(analysis: &QueryAnalysis) -> PlanWeights {
    let mut fts: f64 = 0.5;
    if analysis.has_boolean_ops || analysis.has_quotes {
        fts += 0.2;
    }
    if analysis.has_numbers {
        fts += 0.1;
    }
    if analysis.intent == QueryIntent::Question {
        fts -= 0.2;
    }
    if analysis.stop_word_ratio > 0.4 {
        fts -= 0.1;
    }
    let fts = fts.clamp(0.1, 0.9);
    PlanWeights {
        fts,
        vector: 1.0 - fts,
        ..PlanWeights::default()
    }
}

/// FTS5 match expression. Queries that carry their own operators pass
/// through when they are made of safe characters; everything else is
/// tokenized and each term quoted (implicit AND).
fn build_match_expression(analysis: &QueryAnalysis) -> String {
    let query = analysis.normalized.as_str();
    let balanced_quotes = query.matches('"').count() % 2 == 0;
    let safe = query
        .chars()
        .all(|c| c.is_alphanumeric() || " \"()*-_".contains(c));
    if (analysis.has_boolean_ops || analysis.has_quotes) && safe && balanced_quotes {
        return query.to_string();
    }

    query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

fn trail(rule: &str, analysis: &QueryAnalysis) -> PlanTrail {
    PlanTrail {
        rule: rule.to_string(),
        notes: vec![format!(
            "words={} quotes={} ops={} wildcards={} intent={:?}",
            analysis.word_count,
            analysis.has_quotes,
            analysis.has_boolean_ops,
            analysis.has_wildcards,
            analysis.intent,
        )],
    }
}
