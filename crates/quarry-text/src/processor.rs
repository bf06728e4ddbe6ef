//! The preprocessing pipeline: markup stripping → normalization →
//! truncation, in a fixed order so the output (and therefore every cache
//! key derived from it) is deterministic.

use quarry_core::config::TextProcessingConfig;
use quarry_core::constants::MAX_TEXT_CHARS;
use quarry_core::errors::{QuarryResult, TextError};

use crate::markup;
use crate::truncate;

/// Result of `process`: the exact provider input plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedText {
    pub processed: String,
    pub original_length: usize,
    pub processed_length: usize,
    pub est_tokens: usize,
    pub truncated: bool,
    pub operations_applied: Vec<&'static str>,
}

/// Run the full pipeline. Fails only on empty/whitespace input and on
/// inputs past the hard limit; truncation is not an error.
pub fn process(text: &str, cfg: &TextProcessingConfig) -> QuarryResult<ProcessedText> {
    if text.trim().is_empty() {
        return Err(TextError::Empty.into());
    }
    let original_length = text.chars().count();
    if original_length > MAX_TEXT_CHARS {
        return Err(TextError::TooLong {
            length: original_length,
            limit: MAX_TEXT_CHARS,
        }
        .into());
    }

    let mut out = text.to_string();
    let mut operations_applied = Vec::new();

    if cfg.strip_html {
        out = markup::strip_html_tags(&out);
        operations_applied.push("html_strip");
    }
    if cfg.decode_entities {
        out = markup::decode_entities(&out);
        operations_applied.push("entity_decode");
    }
    if cfg.strip_markdown {
        out = markup::strip_markdown(&out);
        operations_applied.push("markdown_strip");
    }
    if cfg.normalize_whitespace {
        out = markup::normalize_whitespace(&out);
        operations_applied.push("whitespace");
    }
    if cfg.lowercase {
        out = out.to_lowercase();
        operations_applied.push("lowercase");
    }
    if cfg.strip_special_chars {
        out = markup::strip_special_chars(&out);
        if cfg.normalize_whitespace {
            // Removed characters can leave fresh whitespace runs behind.
            out = markup::normalize_whitespace(&out);
        }
        operations_applied.push("special_chars");
    }

    let outcome = truncate::truncate(&out, &cfg.truncation);
    if outcome.truncated {
        operations_applied.push("truncate");
    }
    let processed = outcome.text;

    if processed.trim().is_empty() {
        // Everything stripped away; nothing left to embed.
        return Err(TextError::Empty.into());
    }

    let processed_length = processed.chars().count();
    let est_tokens = processed_length.div_ceil(cfg.truncation.chars_per_token.max(1));

    Ok(ProcessedText {
        processed,
        original_length,
        processed_length,
        est_tokens,
        truncated: outcome.truncated,
        operations_applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::config::{TruncationConfig, TruncationStrategy};

    #[test]
    fn empty_input_fails() {
        let err = process("   \n\t ", &TextProcessingConfig::default()).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn oversized_input_fails() {
        let big = "x".repeat(MAX_TEXT_CHARS + 1);
        let err = process(&big, &TextProcessingConfig::default()).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn at_hard_limit_is_accepted() {
        let text = "y".repeat(MAX_TEXT_CHARS);
        assert!(process(&text, &TextProcessingConfig::default()).is_ok());
    }

    #[test]
    fn full_pipeline() {
        let cfg = TextProcessingConfig {
            lowercase: true,
            ..TextProcessingConfig::default()
        };
        let out = process("<h1>Hello &amp; **Welcome**</h1>\n\n", &cfg).unwrap();
        assert_eq!(out.processed, "hello & welcome");
        assert!(out.operations_applied.contains(&"html_strip"));
        assert!(out.operations_applied.contains(&"lowercase"));
        assert!(!out.truncated);
    }

    #[test]
    fn token_estimate_uses_four_chars() {
        let out = process("abcdefgh", &TextProcessingConfig::default()).unwrap();
        assert_eq!(out.est_tokens, 2);
        let out = process("abcdefghi", &TextProcessingConfig::default()).unwrap();
        assert_eq!(out.est_tokens, 3);
    }

    #[test]
    fn truncation_recorded_not_error() {
        let cfg = TextProcessingConfig {
            truncation: TruncationConfig {
                max_characters: Some(5),
                strategy: TruncationStrategy::Head,
                preserve_word_boundaries: false,
                ..TruncationConfig::default()
            },
            ..TextProcessingConfig::default()
        };
        let out = process("abcdefghij", &cfg).unwrap();
        assert!(out.truncated);
        assert_eq!(out.processed, "abcde");
        assert_eq!(out.original_length, 10);
        assert_eq!(out.processed_length, 5);
    }

    #[test]
    fn markup_only_input_fails_empty() {
        let err = process("<br/><hr/>", &TextProcessingConfig::default()).unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn idempotent_on_own_output() {
        let cfg = TextProcessingConfig {
            lowercase: true,
            truncation: TruncationConfig {
                max_characters: Some(40),
                preserve_word_boundaries: true,
                ..TruncationConfig::default()
            },
            ..TextProcessingConfig::default()
        };
        let first = process("# A Title\n\nSome **bold** prose with a [link](http://e) and a rather long tail of words", &cfg).unwrap();
        let second = process(&first.processed, &cfg).unwrap();
        assert_eq!(first.processed, second.processed);
    }
}
