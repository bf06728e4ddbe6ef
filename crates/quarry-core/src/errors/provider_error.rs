/// Embedding-provider errors, mapped from upstream surfaces (HTTP status
/// codes, local inference failures) by the provider pool.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("authentication failed for {provider}: {reason}")]
    Authentication { provider: String, reason: String },

    #[error("quota exhausted for {provider}")]
    Quota {
        provider: String,
        /// Upstream-provided reset time; overrides the backoff schedule.
        reset_after_ms: Option<u64>,
    },

    #[error("network error calling {provider}: {reason}")]
    Network {
        provider: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("provider {provider} returned malformed output: {reason}")]
    Internal { provider: String, reason: String },

    #[error("provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("environment unsupported for {provider}: missing {requirements:?}")]
    EnvironmentUnsupported {
        provider: String,
        requirements: Vec<String>,
        /// Alternative providers that would work in this environment.
        alternatives: Vec<String>,
    },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::Quota { .. } => "quota",
            Self::Network { .. } => "network",
            Self::Internal { .. } | Self::DimensionMismatch { .. } => "provider_internal",
            Self::Unavailable { .. } => "network",
            Self::EnvironmentUnsupported { .. } => "environment",
        }
    }

    /// Retry rules: timeouts, 429, 5xx, and connection errors retry;
    /// authentication and malformed-output errors never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Quota { .. } => true,
            Self::Network { status, .. } => match status {
                Some(code) => *code == 429 || *code >= 500,
                None => true, // connection-level failure
            },
            Self::Unavailable { .. } => true,
            Self::Authentication { .. }
            | Self::Internal { .. }
            | Self::DimensionMismatch { .. }
            | Self::EnvironmentUnsupported { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_status() {
        let e = ProviderError::Network {
            provider: "p".into(),
            status: Some(404),
            reason: "not found".into(),
        };
        assert!(!e.is_retryable());

        let e = ProviderError::Network {
            provider: "p".into(),
            status: Some(429),
            reason: "slow down".into(),
        };
        assert!(e.is_retryable());

        let e = ProviderError::Network {
            provider: "p".into(),
            status: None,
            reason: "connection refused".into(),
        };
        assert!(e.is_retryable());
    }
}
