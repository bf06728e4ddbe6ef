//! Score normalization and candidate fusion.
//!
//! RRF accumulates `Σ 1/(k + rank)` over 1-based ranks; weighted-sum
//! combines normalized per-side scores with missing sides contributing
//! zero. Output is sorted descending with ties broken by document id.

use std::collections::HashMap;

use quarry_core::models::{
    FtsHit, FusionMethod, KnnHit, PlanWeights, ScoreNormalization,
};

/// A candidate after fusion, carrying per-side provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub doc_id: String,
    pub combined: f64,
    pub fts_score: Option<f64>,
    pub fts_rank: Option<usize>,
    pub vector_score: Option<f64>,
    pub vector_rank: Option<usize>,
}

/// Normalize a score column in place.
pub fn normalize(scores: &mut [f64], method: ScoreNormalization) {
    match method {
        ScoreNormalization::None => {}
        ScoreNormalization::MinMax => {
            let (min, max) = bounds(scores);
            let span = max - min;
            for s in scores.iter_mut() {
                *s = if span.abs() < f64::EPSILON {
                    if scores_nonempty_single(max) { 1.0 } else { 0.0 }
                } else {
                    (*s - min) / span
                };
            }
        }
        ScoreNormalization::ZScore => {
            let n = scores.len() as f64;
            if n == 0.0 {
                return;
            }
            let mean = scores.iter().sum::<f64>() / n;
            let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            for s in scores.iter_mut() {
                *s = if std.abs() < f64::EPSILON {
                    0.0
                } else {
                    (*s - mean) / std
                };
            }
        }
        ScoreNormalization::Sigmoid => {
            for s in scores.iter_mut() {
                *s = 1.0 / (1.0 + (-*s).exp());
            }
        }
    }
}

fn bounds(scores: &[f64]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &s in scores {
        min = min.min(s);
        max = max.max(s);
    }
    (min, max)
}

// Degenerate min-max column: every value equal. Positive columns map to
// 1.0 (a lone hit is still a hit), non-positive to 0.0.
fn scores_nonempty_single(max: f64) -> bool {
    max > 0.0
}

/// Fuse the keyword and vector candidate lists.
pub fn fuse(
    fts: Option<&[FtsHit]>,
    knn: Option<&[KnnHit]>,
    method: FusionMethod,
    weights: &PlanWeights,
    normalization: ScoreNormalization,
    rrf_k: u32,
) -> Vec<FusedCandidate> {
    let mut candidates: HashMap<String, FusedCandidate> = HashMap::new();

    let mut fts_norm: Vec<f64> = fts
        .map(|hits| hits.iter().map(|h| h.score).collect())
        .unwrap_or_default();
    let mut knn_norm: Vec<f64> = knn
        .map(|hits| hits.iter().map(|h| h.similarity).collect())
        .unwrap_or_default();
    let effective_norm = match method {
        FusionMethod::NormalizedWeighted => ScoreNormalization::MinMax,
        _ => normalization,
    };
    normalize(&mut fts_norm, effective_norm);
    normalize(&mut knn_norm, effective_norm);

    if let Some(hits) = fts {
        for (position, hit) in hits.iter().enumerate() {
            let entry = candidates
                .entry(hit.doc_id.clone())
                .or_insert_with(|| empty_candidate(&hit.doc_id));
            entry.fts_score = Some(fts_norm[position]);
            entry.fts_rank = Some(position + 1);
        }
    }
    if let Some(hits) = knn {
        for (position, hit) in hits.iter().enumerate() {
            let entry = candidates
                .entry(hit.doc_id.clone())
                .or_insert_with(|| empty_candidate(&hit.doc_id));
            entry.vector_score = Some(knn_norm[position]);
            entry.vector_rank = Some(position + 1);
        }
    }

    let k = f64::from(rrf_k);
    for candidate in candidates.values_mut() {
        candidate.combined = match method {
            FusionMethod::Rrf => {
                let mut score = 0.0;
                if let Some(rank) = candidate.fts_rank {
                    score += 1.0 / (k + rank as f64);
                }
                if let Some(rank) = candidate.vector_rank {
                    score += 1.0 / (k + rank as f64);
                }
                score
            }
            FusionMethod::WeightedSum | FusionMethod::NormalizedWeighted => {
                weights.fts * candidate.fts_score.unwrap_or(0.0)
                    + weights.vector * candidate.vector_score.unwrap_or(0.0)
            }
            FusionMethod::Max => candidate
                .fts_score
                .unwrap_or(f64::NEG_INFINITY)
                .max(candidate.vector_score.unwrap_or(f64::NEG_INFINITY)),
        };
    }

    let mut fused: Vec<FusedCandidate> = candidates.into_values().collect();
    fused.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    fused
}

fn empty_candidate(doc_id: &str) -> FusedCandidate {
    FusedCandidate {
        doc_id: doc_id.to_string(),
        combined: 0.0,
        fts_score: None,
        fts_rank: None,
        vector_score: None,
        vector_rank: None,
    }
}
