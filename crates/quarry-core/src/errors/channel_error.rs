/// Control-plane channel errors. The only errors the caller domain ever
/// constructs itself.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("transport send failed: {reason}")]
    SendError { reason: String },

    #[error("channel failed: {reason}")]
    ChannelError { reason: String },

    #[error("channel closed")]
    Closed,

    #[error("channel terminated")]
    Terminated,

    #[error("too many in-flight operations: {in_flight} >= {cap}")]
    RateLimit { in_flight: usize, cap: usize },

    #[error("unknown method: {method}")]
    UnknownMethod { method: String },
}

impl ChannelError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SendError { .. } => "send_error",
            Self::ChannelError { .. } => "channel_error",
            Self::Closed => "closed",
            Self::Terminated => "terminated",
            Self::RateLimit { .. } => "rate_limit",
            Self::UnknownMethod { .. } => "invalid_input",
        }
    }
}
