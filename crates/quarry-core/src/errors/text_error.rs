/// Text-processor errors. Surfaced to callers as `invalid_input`.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    #[error("text is empty or whitespace-only")]
    Empty,

    #[error("text exceeds hard limit: {length} > {limit} characters")]
    TooLong { length: usize, limit: usize },
}
