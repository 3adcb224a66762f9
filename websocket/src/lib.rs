//! Real-time fan-out of consensus snapshots to connected subscribers.
//!
//! Every subscriber receives, on connect:
//! - the upstream data sources
//! - the current moniker list
//! - the current consensus snapshot
//!
//! and afterwards every published snapshot and moniker refresh.

pub mod error;
pub mod hub;
pub mod metrics;
pub mod server;

pub use error::HubError;
pub use hub::{BroadcastHub, BroadcastReport, Subscriber, SubscriberId, DEFAULT_MAX_CONCURRENT_SENDS};
pub use metrics::HubMetrics;
pub use server::WebSocketServer;
