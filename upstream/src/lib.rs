//! Access to the monitored chain.
//!
//! - [`ChainSource`]: the narrow query interface the monitor consumes
//!   (staking registry, active validator set, node version, block height,
//!   consensus round state).
//! - [`HttpChainSource`]: `reqwest` implementation against a node's REST API
//!   and Tendermint RPC.
//! - [`EventStream`]: resumable subscription to vote, round-step and
//!   validator-set events over the RPC websocket.

pub mod error;
pub mod event;
pub mod http;
pub mod source;
pub mod stream;

pub use error::UpstreamError;
pub use event::{parse_event, subscription_requests, ChainEvent};
pub use http::{HttpChainSource, HttpSourceConfig};
pub use source::{
    ActiveValidator, ChainSource, RoundVoteRecord, StakingPage, StakingValidator,
    ValidatorSetPage,
};
pub use stream::{websocket_url, EventStream};
