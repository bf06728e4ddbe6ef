//! Error taxonomy for the whole engine.
//!
//! One thiserror enum per subsystem, unified under `QuarryError`. Every
//! variant maps to a stable machine-readable code (the control plane
//! attaches it to wire responses) and declares its own retryability —
//! retry is a decision made by callers inspecting the error, never a
//! catch-and-guess.

pub mod cache_error;
pub mod channel_error;
pub mod config_error;
pub mod provider_error;
pub mod queue_error;
pub mod search_error;
pub mod storage_error;
pub mod text_error;

pub use cache_error::CacheError;
pub use channel_error::ChannelError;
pub use config_error::ConfigError;
pub use provider_error::ProviderError;
pub use queue_error::QueueError;
pub use search_error::SearchError;
pub use storage_error::StorageError;
pub use text_error::TextError;

/// Result alias used across the workspace.
pub type QuarryResult<T> = Result<T, QuarryError>;

/// Umbrella error for the engine.
#[derive(Debug, thiserror::Error)]
pub enum QuarryError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error(transparent)]
    Text(#[from] TextError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("operation cancelled")]
    Cancelled,
}

impl QuarryError {
    /// Shorthand for an `InvalidInput` error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::Text(_) => "invalid_input",
            Self::Config(_) => "configuration",
            Self::Provider(e) => e.code(),
            Self::Cache(_) => "cache",
            Self::Storage(_) => "storage",
            Self::Queue(_) => "queue",
            Self::Search(_) => "search",
            Self::Channel(e) => e.code(),
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the pool may retry the failed operation.
    ///
    /// Only transient provider-side failures qualify. Authentication and
    /// validation failures never do.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(QuarryError::invalid_input("x").code(), "invalid_input");
        assert_eq!(QuarryError::Cancelled.code(), "cancelled");
        assert_eq!(QuarryError::Timeout { elapsed_ms: 5 }.code(), "timeout");
    }

    #[test]
    fn auth_is_never_retryable() {
        let err: QuarryError = ProviderError::Authentication {
            provider: "remote".into(),
            reason: "expired key".into(),
        }
        .into();
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "authentication");
    }

    #[test]
    fn network_is_retryable() {
        let err: QuarryError = ProviderError::Network {
            provider: "remote".into(),
            status: Some(503),
            reason: "upstream down".into(),
        }
        .into();
        assert!(err.is_retryable());
    }
}
