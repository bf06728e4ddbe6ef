//! Deterministic content-aware reranking over the top-N fused results.
//!
//! No model involved: exact-phrase presence, term overlap, and title hits
//! nudge the fused score. Identical inputs always produce identical
//! output order.

use quarry_core::models::SearchResult;

const PHRASE_BONUS: f64 = 0.30;
const TITLE_BONUS: f64 = 0.15;
const OVERLAP_BONUS: f64 = 0.20;

/// Rerank the first `top_k` results in place; the tail keeps its order.
pub fn rerank(results: &mut Vec<SearchResult>, query: &str, terms: &[String], top_k: usize) {
    let k = top_k.min(results.len());
    if k < 2 {
        return;
    }

    let phrase = query.trim().to_lowercase();
    let mut head: Vec<(f64, SearchResult)> = results
        .drain(..k)
        .map(|result| {
            let bonus = score_bonus(&result, &phrase, terms);
            (result.combined_score + bonus, result)
        })
        .collect();

    head.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.id.cmp(&b.1.id))
    });

    let tail: Vec<SearchResult> = results.drain(..).collect();
    *results = head.into_iter().map(|(_, r)| r).collect();
    results.extend(tail);
}

fn score_bonus(result: &SearchResult, phrase: &str, terms: &[String]) -> f64 {
    let content = result.content.as_deref().unwrap_or("").to_lowercase();
    let title = result.title.as_deref().unwrap_or("").to_lowercase();

    let mut bonus = 0.0;
    if !phrase.is_empty() && phrase.split_whitespace().count() > 1 && content.contains(phrase) {
        bonus += PHRASE_BONUS;
    }
    if terms.iter().any(|t| title.contains(t.as_str())) {
        bonus += TITLE_BONUS;
    }
    if !terms.is_empty() {
        let overlap = terms
            .iter()
            .filter(|t| content.contains(t.as_str()))
            .count() as f64
            / terms.len() as f64;
        bonus += OVERLAP_BONUS * overlap;
    }
    bonus
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f64, title: &str, content: &str) -> SearchResult {
        SearchResult {
            collection: "docs".into(),
            id: id.into(),
            title: Some(title.into()),
            content: Some(content.into()),
            metadata: serde_json::json!({}),
            combined_score: score,
            fts_score: None,
            vector_score: None,
            fts_rank: None,
            vector_rank: None,
            snippet: None,
            collection_info: None,
        }
    }

    #[test]
    fn exact_phrase_outranks_scattered_terms() {
        let mut results = vec![
            result("scattered", 0.50, "", "rust is here and async is there"),
            result("phrase", 0.45, "", "a guide to rust async runtimes"),
        ];
        let terms = vec!["rust".to_string(), "async".to_string()];
        rerank(&mut results, "rust async", &terms, 10);
        assert_eq!(results[0].id, "phrase");
    }

    #[test]
    fn tail_keeps_order() {
        let mut results = vec![
            result("a", 0.9, "", "x"),
            result("b", 0.8, "", "x"),
            result("c", 0.7, "", "x"),
            result("d", 0.6, "", "x"),
        ];
        rerank(&mut results, "q", &["q".to_string()], 2);
        assert_eq!(results[2].id, "c");
        assert_eq!(results[3].id, "d");
    }

    #[test]
    fn deterministic() {
        let build = || {
            vec![
                result("a", 0.5, "rust", "rust content"),
                result("b", 0.5, "other", "rust content"),
            ]
        };
        let terms = vec!["rust".to_string()];
        let mut x = build();
        let mut y = build();
        rerank(&mut x, "rust", &terms, 10);
        rerank(&mut y, "rust", &terms, 10);
        let ids = |v: &[SearchResult]| v.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&x), ids(&y));
    }
}
