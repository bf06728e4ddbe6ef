use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CHARS_PER_TOKEN;

/// Where truncation removes characters from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    #[default]
    Head,
    Tail,
    /// Keep a prefix and a suffix, eliding the middle.
    Middle,
}

/// Truncation budget and policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncationConfig {
    pub max_characters: Option<usize>,
    pub max_tokens: Option<usize>,
    /// Token estimate divisor; the default matches the fixed
    /// four-characters-per-token heuristic.
    pub chars_per_token: usize,
    pub strategy: TruncationStrategy,
    pub preserve_word_boundaries: bool,
    /// Inserted at the elision point when present.
    pub truncation_indicator: Option<String>,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            max_characters: None,
            max_tokens: None,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            strategy: TruncationStrategy::Head,
            preserve_word_boundaries: true,
            truncation_indicator: None,
        }
    }
}

/// Content-hash algorithm. SHA-256 unless crypto is disabled for the
/// deployment, in which case the deterministic djb2 variant is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Djb2,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Djb2 => "djb2",
        }
    }
}

/// Deterministic preprocessing applied before embedding and cache keying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextProcessingConfig {
    pub strip_html: bool,
    pub decode_entities: bool,
    pub strip_markdown: bool,
    pub normalize_whitespace: bool,
    pub lowercase: bool,
    pub strip_special_chars: bool,
    pub truncation: TruncationConfig,
    pub hash_algorithm: HashAlgorithm,
}

impl Default for TextProcessingConfig {
    fn default() -> Self {
        Self {
            strip_html: true,
            decode_entities: true,
            strip_markdown: true,
            normalize_whitespace: true,
            lowercase: false,
            strip_special_chars: false,
            truncation: TruncationConfig::default(),
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}
