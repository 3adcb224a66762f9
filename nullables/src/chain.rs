//! Nullable chain source: scripted upstream answers.

use async_trait::async_trait;
use cmon_types::DataSources;
use cmon_upstream::{
    ActiveValidator, ChainSource, RoundVoteRecord, StakingPage, StakingValidator, UpstreamError,
    ValidatorSetPage,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Everything the source will answer, behind one lock.
struct Script {
    staking_pages: Vec<Vec<StakingValidator>>,
    active_pages: Vec<Vec<ActiveValidator>>,
    directory_reachable: bool,
    version: Option<String>,
    height: Option<u64>,
    round_vote_record: Option<RoundVoteRecord>,
    /// Added before every chain-state answer.
    latency: Option<Duration>,
    calls: HashMap<&'static str, usize>,
}

/// A test chain source that answers from a script instead of the network.
///
/// `None` in any scripted fact makes the matching query fail as unreachable.
/// Staking pages are chained by cursors `"1"`, `"2"`, ...; active-set pages
/// are numbered from 1 and all report the same total.
pub struct NullChainSource {
    script: Mutex<Script>,
}

impl NullChainSource {
    /// A reachable node with an empty registry, version `v0.38.0`, height 1
    /// and a round state in which nobody has voted.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                staking_pages: Vec::new(),
                active_pages: Vec::new(),
                directory_reachable: true,
                version: Some("v0.38.0".to_string()),
                height: Some(1),
                round_vote_record: Some(Self::idle_record(0)),
                latency: None,
                calls: HashMap::new(),
            }),
        }
    }

    /// Single-page registry and active set from `(address, pub_key, moniker)`.
    pub fn with_validators(validators: &[(&str, &str, &str)]) -> Self {
        let source = Self::new();
        source.set_validators(validators);
        source
    }

    /// A round record with `0/total` for both vote kinds.
    pub fn idle_record(total: u64) -> RoundVoteRecord {
        let status = format!("BA{{0:}} 0/{total} = 0.00");
        RoundVoteRecord {
            prevotes_bit_array: status.clone(),
            precommits_bit_array: status,
            ..Default::default()
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_validators(&self, validators: &[(&str, &str, &str)]) {
        let mut script = self.script();
        script.staking_pages = vec![validators
            .iter()
            .map(|(_, pub_key, moniker)| StakingValidator {
                consensus_pubkey: pub_key.to_string(),
                moniker: moniker.to_string(),
            })
            .collect()];
        script.active_pages = vec![validators
            .iter()
            .map(|(address, pub_key, _)| ActiveValidator {
                address: address.to_string(),
                pub_key: pub_key.to_string(),
            })
            .collect()];
    }

    pub fn set_staking_pages(&self, pages: Vec<Vec<StakingValidator>>) {
        self.script().staking_pages = pages;
    }

    pub fn set_active_pages(&self, pages: Vec<Vec<ActiveValidator>>) {
        self.script().active_pages = pages;
    }

    /// Make the registry and active-set queries fail (or succeed again).
    pub fn set_directory_reachable(&self, reachable: bool) {
        self.script().directory_reachable = reachable;
    }

    pub fn set_version(&self, version: Option<&str>) {
        self.script().version = version.map(str::to_string);
    }

    pub fn set_height(&self, height: Option<u64>) {
        self.script().height = height;
    }

    pub fn set_round_vote_record(&self, record: Option<RoundVoteRecord>) {
        self.script().round_vote_record = record;
    }

    /// Slow down the version, height and round-state queries.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.script().latency = latency;
    }

    async fn stall(&self) {
        let latency = self.script().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// How many times `operation` was called (`"node_version"`, ...).
    pub fn calls(&self, operation: &str) -> usize {
        self.script().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        self.script().calls.clear();
    }

    fn record_call(&self, operation: &'static str) -> MutexGuard<'_, Script> {
        let mut script = self.script();
        *script.calls.entry(operation).or_default() += 1;
        script
    }
}

impl Default for NullChainSource {
    fn default() -> Self {
        Self::new()
    }
}

fn unreachable(operation: &str) -> UpstreamError {
    UpstreamError::Unreachable(format!("null source: {operation} unavailable"))
}

#[async_trait]
impl ChainSource for NullChainSource {
    async fn staking_validators(
        &self,
        page_key: Option<&str>,
    ) -> Result<StakingPage, UpstreamError> {
        let script = self.record_call("staking_validators");
        if !script.directory_reachable {
            return Err(unreachable("staking_validators"));
        }
        let index = match page_key {
            None => 0,
            Some(key) => key
                .parse::<usize>()
                .map_err(|_| UpstreamError::InvalidResponse(format!("bad cursor {key:?}")))?,
        };
        let validators = script.staking_pages.get(index).cloned().unwrap_or_default();
        let next_key = (index + 1 < script.staking_pages.len()).then(|| (index + 1).to_string());
        Ok(StakingPage {
            validators,
            next_key,
        })
    }

    async fn active_validators(&self, page: u32) -> Result<ValidatorSetPage, UpstreamError> {
        let script = self.record_call("active_validators");
        if !script.directory_reachable {
            return Err(unreachable("active_validators"));
        }
        let total = script.active_pages.iter().map(Vec::len).sum::<usize>() as u64;
        let validators = (page as usize)
            .checked_sub(1)
            .and_then(|i| script.active_pages.get(i))
            .cloned()
            .unwrap_or_default();
        Ok(ValidatorSetPage {
            count: validators.len() as u64,
            validators,
            total,
        })
    }

    async fn node_version(&self) -> Result<String, UpstreamError> {
        self.stall().await;
        let script = self.record_call("node_version");
        script.version.clone().ok_or_else(|| unreachable("node_version"))
    }

    async fn block_height(&self) -> Result<u64, UpstreamError> {
        self.stall().await;
        let script = self.record_call("block_height");
        script.height.ok_or_else(|| unreachable("block_height"))
    }

    async fn round_vote_record(&self) -> Result<RoundVoteRecord, UpstreamError> {
        self.stall().await;
        let script = self.record_call("round_vote_record");
        script
            .round_vote_record
            .clone()
            .ok_or_else(|| unreachable("round_vote_record"))
    }

    fn data_sources(&self) -> DataSources {
        DataSources {
            api: "null://api".to_string(),
            rpc: "null://rpc".to_string(),
        }
    }
}
