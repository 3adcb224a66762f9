use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("subscriber connection closed")]
    Closed,

    #[error("send failed: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
