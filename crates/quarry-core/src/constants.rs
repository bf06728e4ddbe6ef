// Single source of truth for hard limits shared across crates.

/// Embedding dimensionalities accepted in collection configuration.
pub const SUPPORTED_DIMENSIONS: [usize; 7] = [256, 384, 512, 768, 1024, 1536, 3072];

/// Hard input limit for the text processor (characters).
pub const MAX_TEXT_CHARS: usize = 1_000_000;

/// Serialized metadata cap per document (bytes).
pub const MAX_METADATA_BYTES: usize = 1_048_576;

/// Collection names: `[A-Za-z0-9_-]`, at most this many characters.
pub const MAX_COLLECTION_NAME_LEN: usize = 50;

/// Fixed token estimate used by the text processor: 4 characters per token.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Retry backoff hard cap (milliseconds).
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Check whether a dimensionality is in the supported set.
pub fn is_supported_dimension(dims: usize) -> bool {
    SUPPORTED_DIMENSIONS.contains(&dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_dimensions_are_sorted() {
        let mut sorted = SUPPORTED_DIMENSIONS;
        sorted.sort_unstable();
        assert_eq!(sorted, SUPPORTED_DIMENSIONS);
    }

    #[test]
    fn dimension_check() {
        assert!(is_supported_dimension(384));
        assert!(is_supported_dimension(3072));
        assert!(!is_supported_dimension(100));
        assert!(!is_supported_dimension(0));
    }
}
