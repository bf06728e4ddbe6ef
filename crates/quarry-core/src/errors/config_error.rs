/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("unsupported dimensions {dimensions}; supported: {supported:?}")]
    UnsupportedDimensions {
        dimensions: usize,
        supported: &'static [usize],
    },

    #[error("model {model} does not support {dimensions} dimensions")]
    IncompatibleModel { model: String, dimensions: usize },

    #[error("API key has invalid format for provider {provider}")]
    BadApiKey { provider: String },

    #[error("batch size {requested} exceeds provider limit {limit}")]
    BatchSizeOutOfRange { requested: usize, limit: usize },

    #[error("timeout {timeout_ms}ms is below the 1000ms minimum")]
    TimeoutTooShort { timeout_ms: u64 },

    #[error("invalid collection name: {reason}")]
    InvalidCollectionName { reason: String },

    #[error("config parse failed: {reason}")]
    ParseFailed { reason: String },

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}
