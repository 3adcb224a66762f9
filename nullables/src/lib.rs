//! Nullable infrastructure for deterministic testing.
//!
//! The monitor's external dependencies (the upstream chain, connected
//! subscribers) sit behind the `ChainSource` and `Subscriber` traits. This
//! crate provides test-friendly implementations that:
//! - Return scripted values
//! - Can be controlled programmatically, including failures
//! - Never touch the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod chain;
pub mod subscriber;

pub use chain::NullChainSource;
pub use subscriber::{NullSubscriber, SendTracker};
