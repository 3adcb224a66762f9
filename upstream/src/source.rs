//! The query interface the monitor consumes, and the records it returns.

use async_trait::async_trait;
use cmon_types::{DataSources, RoundStep, VoteKind};

use crate::UpstreamError;

/// One validator from the staking registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakingValidator {
    pub consensus_pubkey: String,
    pub moniker: String,
}

/// One page of the staking registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StakingPage {
    pub validators: Vec<StakingValidator>,
    /// Continuation cursor; `None` when this is the last page.
    pub next_key: Option<String>,
}

/// One member of the active validator set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveValidator {
    pub address: String,
    pub pub_key: String,
}

/// One page of the active validator set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorSetPage {
    pub validators: Vec<ActiveValidator>,
    /// Entries on this page.
    pub count: u64,
    /// Entries across all pages.
    pub total: u64,
}

/// Raw vote sets for the first height/round reported by the consensus state.
///
/// Vote entries are kept as the node renders them (`"Vote{0:AAA111111111 ...}"`),
/// with `None` for JSON nulls. Decoding is left to the tally parser.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundVoteRecord {
    /// Step decoded from the `height/round/step` status, when present.
    pub step: Option<RoundStep>,
    pub round: u32,
    pub prevotes: Vec<Option<String>>,
    pub prevotes_bit_array: String,
    pub precommits: Vec<Option<String>>,
    pub precommits_bit_array: String,
}

impl RoundVoteRecord {
    pub fn votes(&self, kind: VoteKind) -> &[Option<String>] {
        match kind {
            VoteKind::Prevote => &self.prevotes,
            VoteKind::Precommit => &self.precommits,
        }
    }

    pub fn bit_array(&self, kind: VoteKind) -> &str {
        match kind {
            VoteKind::Prevote => &self.prevotes_bit_array,
            VoteKind::Precommit => &self.precommits_bit_array,
        }
    }
}

/// Point queries against the monitored chain.
///
/// Every call is independent and failable; callers decide whether a failure
/// is fatal (directory bootstrap) or cycle-local (everything else).
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// One page of the staking registry. `page_key` is the cursor returned
    /// by the previous page, `None` for the first page.
    async fn staking_validators(&self, page_key: Option<&str>)
        -> Result<StakingPage, UpstreamError>;

    /// One page (1-based) of the active validator set.
    async fn active_validators(&self, page: u32) -> Result<ValidatorSetPage, UpstreamError>;

    /// Software version reported by the node.
    async fn node_version(&self) -> Result<String, UpstreamError>;

    /// Height of the latest block.
    async fn block_height(&self) -> Result<u64, UpstreamError>;

    /// Vote sets of the first entry in the consensus state's height vote set.
    async fn round_vote_record(&self) -> Result<RoundVoteRecord, UpstreamError>;

    /// The endpoints behind this source, as shown to subscribers.
    fn data_sources(&self) -> DataSources;
}
