use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connect failure or timeout. The only class of error that is retried.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("event subscription: {0}")]
    Subscription(String),
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}
