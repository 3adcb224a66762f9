//! Fundamental types for the consensus monitor.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! validator identity keys and the directory built from them, round steps and
//! vote kinds, participation tallies, the broadcast snapshot, and the JSON
//! messages sent to subscribers.

pub mod directory;
pub mod message;
pub mod round;
pub mod snapshot;
pub mod tally;

pub use directory::{IdentityKey, ValidatorDirectory, IDENTITY_KEY_LEN};
pub use message::{DataSources, ServerMessage};
pub use round::{RoundStep, VoteKind};
pub use snapshot::{ConsensusSnapshot, OnlineSnapshot};
pub use tally::Tally;
