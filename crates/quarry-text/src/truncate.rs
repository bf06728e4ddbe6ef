//! Character-budget truncation with head/tail/middle strategies.
//!
//! Budgets count characters, not bytes. The indicator, when configured,
//! fits inside the budget; word-boundary preservation only ever shrinks
//! the kept region.

use quarry_core::config::{TruncationConfig, TruncationStrategy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncationOutcome {
    pub text: String,
    pub truncated: bool,
}

/// Effective character budget: the tighter of `max_characters` and
/// `max_tokens × chars_per_token`. `None` means unbounded.
pub fn budget(cfg: &TruncationConfig) -> Option<usize> {
    let from_tokens = cfg
        .max_tokens
        .map(|t| t.saturating_mul(cfg.chars_per_token.max(1)));
    match (cfg.max_characters, from_tokens) {
        (Some(c), Some(t)) => Some(c.min(t)),
        (Some(c), None) => Some(c),
        (None, Some(t)) => Some(t),
        (None, None) => None,
    }
}

/// Truncate `text` to the configured budget. Text exactly at the budget is
/// returned untouched.
pub fn truncate(text: &str, cfg: &TruncationConfig) -> TruncationOutcome {
    let Some(budget) = budget(cfg) else {
        return TruncationOutcome {
            text: text.to_string(),
            truncated: false,
        };
    };

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= budget {
        return TruncationOutcome {
            text: text.to_string(),
            truncated: false,
        };
    }

    let indicator = cfg.truncation_indicator.as_deref().unwrap_or("");
    let indicator_len = indicator.chars().count();
    // The indicator fits inside the budget; with a degenerate budget the
    // indicator is dropped rather than overflowing it.
    let keep = budget.saturating_sub(indicator_len);
    let indicator = if budget >= indicator_len { indicator } else { "" };

    let text = match cfg.strategy {
        TruncationStrategy::Head => {
            let mut end = keep;
            if cfg.preserve_word_boundaries {
                end = back_to_boundary(&chars, end);
            }
            let kept: String = chars[..end].iter().collect();
            format!("{}{}", kept.trim_end(), indicator)
        }
        TruncationStrategy::Tail => {
            let mut start = chars.len() - keep;
            if cfg.preserve_word_boundaries {
                start = forward_to_boundary(&chars, start);
            }
            let kept: String = chars[start..].iter().collect();
            format!("{}{}", indicator, kept.trim_start())
        }
        TruncationStrategy::Middle => {
            let head_keep = keep / 2;
            let tail_keep = keep - head_keep;
            let mut head_end = head_keep;
            let mut tail_start = chars.len() - tail_keep;
            if cfg.preserve_word_boundaries {
                head_end = back_to_boundary(&chars, head_end);
                tail_start = forward_to_boundary(&chars, tail_start);
            }
            let head: String = chars[..head_end].iter().collect();
            let tail: String = chars[tail_start..].iter().collect();
            format!("{}{}{}", head.trim_end(), indicator, tail.trim_start())
        }
    };

    TruncationOutcome {
        text,
        truncated: true,
    }
}

/// Move a cut point left to the nearest whitespace so no word is split.
/// Falls back to the hard cut when the region has no whitespace at all.
fn back_to_boundary(chars: &[char], cut: usize) -> usize {
    if cut == 0 || cut >= chars.len() || chars[cut].is_whitespace() {
        return cut;
    }
    match chars[..cut].iter().rposition(|c| c.is_whitespace()) {
        Some(pos) => pos,
        None => cut,
    }
}

/// Move a cut point right to just past the nearest whitespace.
fn forward_to_boundary(chars: &[char], cut: usize) -> usize {
    if cut == 0 || cut >= chars.len() || chars[cut - 1].is_whitespace() {
        return cut;
    }
    match chars[cut..].iter().position(|c| c.is_whitespace()) {
        Some(pos) => cut + pos + 1,
        None => cut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_chars: usize) -> TruncationConfig {
        TruncationConfig {
            max_characters: Some(max_chars),
            preserve_word_boundaries: false,
            ..TruncationConfig::default()
        }
    }

    #[test]
    fn exact_budget_is_untouched() {
        let out = truncate("abcde", &cfg(5));
        assert!(!out.truncated);
        assert_eq!(out.text, "abcde");
    }

    #[test]
    fn one_over_is_truncated() {
        let out = truncate("abcdef", &cfg(5));
        assert!(out.truncated);
        assert_eq!(out.text, "abcde");
    }

    #[test]
    fn token_budget_applies() {
        let c = TruncationConfig {
            max_tokens: Some(2), // 8 chars at 4 chars/token
            preserve_word_boundaries: false,
            ..TruncationConfig::default()
        };
        let out = truncate("123456789", &c);
        assert!(out.truncated);
        assert_eq!(out.text.chars().count(), 8);
    }

    #[test]
    fn tighter_budget_wins() {
        let c = TruncationConfig {
            max_characters: Some(4),
            max_tokens: Some(100),
            preserve_word_boundaries: false,
            ..TruncationConfig::default()
        };
        assert_eq!(truncate("abcdefgh", &c).text, "abcd");
    }

    #[test]
    fn tail_keeps_suffix() {
        let c = TruncationConfig {
            max_characters: Some(3),
            strategy: TruncationStrategy::Tail,
            preserve_word_boundaries: false,
            ..TruncationConfig::default()
        };
        assert_eq!(truncate("abcdef", &c).text, "def");
    }

    #[test]
    fn middle_keeps_both_ends() {
        let c = TruncationConfig {
            max_characters: Some(6),
            strategy: TruncationStrategy::Middle,
            preserve_word_boundaries: false,
            truncation_indicator: Some("…".to_string()),
            ..TruncationConfig::default()
        };
        let out = truncate("aaaa bbbb cccc", &c);
        assert!(out.truncated);
        assert!(out.text.contains('…'));
        assert!(out.text.chars().count() <= 6);
        assert!(out.text.starts_with("aa"));
        assert!(out.text.ends_with("cc"));
    }

    #[test]
    fn indicator_fits_in_budget() {
        let c = TruncationConfig {
            max_characters: Some(10),
            truncation_indicator: Some("...".to_string()),
            preserve_word_boundaries: false,
            ..TruncationConfig::default()
        };
        let out = truncate("abcdefghijklmnop", &c);
        assert!(out.text.chars().count() <= 10);
        assert!(out.text.ends_with("..."));
    }

    #[test]
    fn word_boundary_never_extends_budget() {
        let c = TruncationConfig {
            max_characters: Some(9),
            preserve_word_boundaries: true,
            ..TruncationConfig::default()
        };
        let out = truncate("hello brave world", &c);
        assert!(out.truncated);
        assert!(out.text.chars().count() <= 9);
        assert_eq!(out.text, "hello");
    }

    #[test]
    fn unboundaried_region_falls_back_to_hard_cut() {
        let c = TruncationConfig {
            max_characters: Some(4),
            preserve_word_boundaries: true,
            ..TruncationConfig::default()
        };
        assert_eq!(truncate("abcdefgh", &c).text, "abcd");
    }

    #[test]
    fn no_budget_means_no_truncation() {
        let out = truncate(&"x".repeat(10_000), &TruncationConfig::default());
        assert!(!out.truncated);
    }

    #[test]
    fn truncation_is_idempotent() {
        let c = cfg(7);
        let once = truncate("abcdefghij", &c);
        let twice = truncate(&once.text, &c);
        assert!(!twice.truncated);
        assert_eq!(once.text, twice.text);
    }
}
