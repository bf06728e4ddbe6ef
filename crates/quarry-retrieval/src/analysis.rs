//! Query feature extraction and intent classification. Everything here is
//! cheap surface analysis: no embeddings, no SQL.

use std::sync::LazyLock;

use regex::Regex;

use quarry_core::models::{QueryAnalysis, QueryComplexity, QueryIntent, SearchStrategy};

static BOOLEAN_OPS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(AND|OR|NOT)\b").unwrap());
static URL_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(https?://|www\.|\bsite:)").unwrap());
static TRANSACTIONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(buy|purchase|order|download|install|subscribe|sign\s?up)\b").unwrap()
});

const QUESTION_WORDS: &[&str] = &[
    "who", "what", "when", "where", "why", "how", "which", "is", "are", "can", "does", "do",
];

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were", "will",
    "with",
];

/// Stateless analyzer. One instance is shared by the executor.
#[derive(Debug, Default)]
pub struct QueryAnalyzer;

impl QueryAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        let original = query.to_string();
        let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ");
        let lower = normalized.to_lowercase();

        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '*' && c != '?')
            .filter(|w| !w.is_empty())
            .collect();
        let word_count = words.len();
        let avg_word_length = if word_count == 0 {
            0.0
        } else {
            words.iter().map(|w| w.len()).sum::<usize>() as f64 / word_count as f64
        };

        let stop_count = words.iter().filter(|w| STOP_WORDS.contains(w)).count();
        let stop_word_ratio = if word_count == 0 {
            0.0
        } else {
            stop_count as f64 / word_count as f64
        };

        let has_quotes = normalized.contains('"');
        let has_boolean_ops = BOOLEAN_OPS.is_match(&normalized);
        let has_wildcards = normalized.contains('*') || normalized.contains('?');
        let has_numbers = normalized.chars().any(|c| c.is_ascii_digit());

        let intent = classify_intent(&lower, &words);
        let complexity = classify_complexity(word_count, has_boolean_ops, has_quotes);
        let (suggested, alternatives) = suggest_strategy(
            has_quotes,
            has_boolean_ops,
            has_wildcards,
            word_count,
            intent,
        );

        QueryAnalysis {
            original,
            length: normalized.chars().count(),
            normalized,
            word_count,
            avg_word_length,
            has_quotes,
            has_boolean_ops,
            has_wildcards,
            has_numbers,
            has_stop_words: stop_count > 0,
            stop_word_ratio,
            intent,
            complexity,
            suggested_strategy: suggested,
            alternative_strategies: alternatives,
        }
    }

    /// Content-bearing terms for snippets and reranking: lowercased,
    /// stop words removed.
    pub fn content_terms(&self, query: &str) -> Vec<String> {
        query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 2 && !STOP_WORDS.contains(w))
            .map(str::to_string)
            .collect()
    }
}

fn classify_intent(lower: &str, words: &[&str]) -> QueryIntent {
    if URL_LIKE.is_match(lower) {
        return QueryIntent::Navigational;
    }
    if TRANSACTIONAL.is_match(lower) {
        return QueryIntent::Transactional;
    }
    if let Some(first) = words.first() {
        if QUESTION_WORDS.contains(first) || lower.ends_with('?') {
            return QueryIntent::Question;
        }
    }
    QueryIntent::Search
}

fn classify_complexity(word_count: usize, has_boolean_ops: bool, has_quotes: bool) -> QueryComplexity {
    if word_count >= 8 || (has_boolean_ops && has_quotes) {
        QueryComplexity::High
    } else if word_count >= 3 || has_boolean_ops || has_quotes {
        QueryComplexity::Medium
    } else {
        QueryComplexity::Low
    }
}

fn suggest_strategy(
    has_quotes: bool,
    has_boolean_ops: bool,
    has_wildcards: bool,
    word_count: usize,
    intent: QueryIntent,
) -> (SearchStrategy, Vec<SearchStrategy>) {
    if has_quotes || has_boolean_ops || has_wildcards {
        return (
            SearchStrategy::Keyword,
            vec![SearchStrategy::Hybrid, SearchStrategy::Vector],
        );
    }
    if intent == QueryIntent::Question || (1..=5).contains(&word_count) {
        return (
            SearchStrategy::Vector,
            vec![SearchStrategy::Hybrid, SearchStrategy::Keyword],
        );
    }
    (
        SearchStrategy::Hybrid,
        vec![SearchStrategy::Keyword, SearchStrategy::Vector],
    )
}
