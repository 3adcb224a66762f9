use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// The validator directory could not be built. Fatal at startup.
    #[error("validator directory unavailable: {0}")]
    Directory(String),

    #[error("upstream error: {0}")]
    Upstream(#[from] cmon_upstream::UpstreamError),

    #[error("tally error: {0}")]
    Tally(#[from] TallyError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket server error: {0}")]
    WebSocket(#[from] cmon_websocket::HubError),
}

/// A round-vote record that cannot be turned into a tally.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TallyError {
    #[error("no votes-in/total ratio in {0:?}")]
    MalformedRatio(String),

    #[error("{votes_in} votes in against zero total voting power")]
    ZeroTotalPower { votes_in: u64 },
}
