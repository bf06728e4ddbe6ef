//! Maximal-marginal-relevance diversity pass: greedily reselect results,
//! penalizing near-duplicates of what was already picked. Similarity is
//! term-set Jaccard over title+content, so it needs no embeddings.

use std::collections::HashSet;

use quarry_core::models::SearchResult;

/// Reorder `results` by MMR with trade-off `lambda` (1.0 = pure
/// relevance, 0.0 = pure novelty).
pub fn diversify(results: &mut Vec<SearchResult>, lambda: f64) {
    if results.len() < 3 {
        return;
    }
    let lambda = lambda.clamp(0.0, 1.0);

    let term_sets: Vec<HashSet<String>> = results.iter().map(term_set).collect();
    let mut remaining: Vec<usize> = (0..results.len()).collect();
    let mut picked: Vec<usize> = Vec::with_capacity(results.len());

    while !remaining.is_empty() {
        let mut best_slot = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (slot, &candidate) in remaining.iter().enumerate() {
            let max_sim = picked
                .iter()
                .map(|&p| jaccard(&term_sets[candidate], &term_sets[p]))
                .fold(0.0f64, f64::max);
            let value = lambda * results[candidate].combined_score - (1.0 - lambda) * max_sim;
            if value > best_value {
                best_value = value;
                best_slot = slot;
            }
        }
        picked.push(remaining.swap_remove(best_slot));
    }

    let mut reordered = Vec::with_capacity(results.len());
    for index in picked {
        reordered.push(results[index].clone());
    }
    *results = reordered;
}

fn term_set(result: &SearchResult) -> HashSet<String> {
    let mut text = result.title.clone().unwrap_or_default();
    text.push(' ');
    text.push_str(result.content.as_deref().unwrap_or(""));
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = (a.len() + b.len()) as f64 - intersection;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f64, content: &str) -> SearchResult {
        SearchResult {
            collection: "docs".into(),
            id: id.into(),
            title: None,
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
    fn near_duplicates_get_pushed_down() {
        let mut results = vec![
            result("a", 0.90, "rust async runtime scheduling internals"),
            result("a2", 0.89, "rust async runtime scheduling internals"),
            result("b", 0.70, "sqlite storage engine page format"),
        ];
        diversify(&mut results, 0.5);
        assert_eq!(results[0].id, "a", "top relevance survives");
        assert_eq!(results[1].id, "b", "novel document beats the duplicate");
        assert_eq!(results[2].id, "a2");
    }

    #[test]
    fn lambda_one_keeps_relevance_order() {
        let mut results = vec![
            result("a", 0.9, "same words here"),
            result("b", 0.8, "same words here"),
            result("c", 0.7, "same words here"),
        ];
        diversify(&mut results, 1.0);
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn short_lists_untouched() {
        let mut results = vec![result("a", 0.9, "x"), result("b", 0.8, "y")];
        diversify(&mut results, 0.3);
        assert_eq!(results[0].id, "a");
    }
}
