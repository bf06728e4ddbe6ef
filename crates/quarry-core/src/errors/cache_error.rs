/// Cache-tier errors. Tier 2/3 failures are logged and swallowed by the
/// coordinator; they never fail the request that triggered them.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache tier {tier} unavailable: {reason}")]
    TierUnavailable { tier: &'static str, reason: String },

    #[error("cache entry codec failed: {reason}")]
    Codec { reason: String },

    #[error("invalid invalidation pattern: {pattern}")]
    BadPattern { pattern: String },
}
