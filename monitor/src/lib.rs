//! Consensus-state aggregation.
//!
//! - [`directory::rebuild`]: identity key → moniker directory from the
//!   staking registry and the active validator set.
//! - [`ChainStateReader`]: failable point queries (version, height, round state).
//! - [`TallyParser`]: raw vote sets → participation tallies.
//! - [`StateAggregator`]: the current snapshot, change detection and event handling.
//! - [`MonitorDriver`]: polled and event-driven drive loops feeding the
//!   [`BroadcastHub`](cmon_websocket::BroadcastHub).

pub mod aggregator;
pub mod config;
pub mod directory;
pub mod driver;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod reader;
pub mod shutdown;
pub mod tally;

pub use aggregator::StateAggregator;
pub use config::{DriveMode, MonitorConfig};
pub use driver::MonitorDriver;
pub use error::{MonitorError, TallyError};
pub use logging::{init_logging, LogFormat};
pub use metrics::MonitorMetrics;
pub use reader::ChainStateReader;
pub use shutdown::{ShutdownController, ShutdownSignal};
pub use tally::{decode_ratio, parse_vote_entry, TallyParser, VoteEntry};
