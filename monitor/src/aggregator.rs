//! The canonical consensus snapshot and how it is refreshed.

use cmon_types::{
    ConsensusSnapshot, IdentityKey, OnlineSnapshot, RoundStep, ServerMessage, ValidatorDirectory,
};
use cmon_upstream::ChainEvent;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::directory;
use crate::metrics::MonitorMetrics;
use crate::reader::ChainStateReader;
use crate::tally::TallyParser;

pub const MSG_NO_VERSION: &str = "Could not obtain node version";
pub const MSG_NO_HEIGHT: &str = "Could not obtain block height";
pub const MSG_NO_ROUND_STATE: &str = "Could not obtain round state";
pub const MSG_BAD_ROUND_STATE: &str = "Could not decode round state";

/// Which chain facts a cycle re-queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Facts {
    /// Version, height and round state.
    All,
    /// Round state only; version and height come from the cache when present.
    RoundStateOnly,
}

/// Owns the validator directory and the current snapshot.
///
/// Only the drive loop mutates an aggregator; there is exactly one writer.
/// The directory is swapped wholesale on rebuild, so a tally always runs
/// against one complete directory.
pub struct StateAggregator {
    reader: ChainStateReader,
    parser: TallyParser,
    directory: Arc<ValidatorDirectory>,
    round_step: RoundStep,
    current: ConsensusSnapshot,
    /// Version and height from the last successful query, reused by vote events.
    cached_version: Option<String>,
    cached_height: Option<u64>,
    metrics: MonitorMetrics,
}

impl StateAggregator {
    pub fn new(
        reader: ChainStateReader,
        directory: ValidatorDirectory,
        metrics: MonitorMetrics,
    ) -> Self {
        metrics.directory_size.set(directory.len() as i64);
        Self {
            reader,
            parser: TallyParser::new(metrics.clone()),
            directory: Arc::new(directory),
            round_step: RoundStep::default(),
            current: ConsensusSnapshot::offline("Waiting for first update"),
            cached_version: None,
            cached_height: None,
            metrics,
        }
    }

    pub fn directory(&self) -> Arc<ValidatorDirectory> {
        self.directory.clone()
    }

    pub fn monikers(&self) -> Vec<String> {
        self.directory.monikers()
    }

    pub fn snapshot(&self) -> &ConsensusSnapshot {
        &self.current
    }

    pub fn round_step(&self) -> &RoundStep {
        &self.round_step
    }

    /// One polled cycle. Returns the new snapshot only if it differs from
    /// the previous one.
    pub async fn refresh_polled(&mut self) -> Option<ConsensusSnapshot> {
        let next = self.build(Facts::All, true).await;
        let previous = self.commit(next);
        (previous != self.current).then(|| self.current.clone())
    }

    /// React to one upstream event. Returns the messages to publish, in order.
    ///
    /// Every matched event publishes its snapshot, changed or not.
    pub async fn refresh_on_event(&mut self, event: ChainEvent) -> Vec<ServerMessage> {
        self.metrics
            .events
            .with_label_values(&[event.class()])
            .inc();

        match event {
            ChainEvent::Vote {
                kind,
                validator_address,
            } => {
                if self.round_step != kind.active_step() {
                    debug!(%kind, step = %self.round_step, "vote outside its step, ignoring");
                    return Vec::new();
                }
                let key = IdentityKey::from_address(&validator_address);
                if !self.directory.contains(&key) {
                    debug!(%kind, identity_key = %key, "vote from validator not in directory, ignoring");
                    return Vec::new();
                }
                vec![self.refresh(Facts::RoundStateOnly).await]
            }
            ChainEvent::NewRoundStep { height, step, .. } => {
                debug!(height, %step, "round step changed");
                self.round_step = step;
                vec![self.refresh(Facts::All).await]
            }
            ChainEvent::ValidatorSetUpdates => {
                let mut messages = Vec::with_capacity(2);
                if self.rebuild_directory().await {
                    messages.push(ServerMessage::Monikers {
                        monikers: self.monikers(),
                    });
                }
                messages.push(self.refresh(Facts::All).await);
                messages
            }
        }
    }

    /// Rebuild the directory and swap it in. On failure the previous
    /// directory stays in place.
    pub async fn rebuild_directory(&mut self) -> bool {
        match directory::rebuild(self.reader.source()).await {
            Ok(directory) => {
                info!(validators = directory.len(), "validator directory rebuilt");
                self.metrics.directory_size.set(directory.len() as i64);
                self.directory = Arc::new(directory);
                true
            }
            Err(e) => {
                warn!(error = %e, "directory rebuild failed, keeping previous directory");
                false
            }
        }
    }

    async fn refresh(&mut self, facts: Facts) -> ServerMessage {
        let next = self.build(facts, false).await;
        self.commit(next);
        ServerMessage::Snapshot(self.current.clone())
    }

    /// Assemble a candidate snapshot. Version, height and round state are
    /// queried in that order; the first missing fact makes the whole
    /// snapshot offline.
    async fn build(&mut self, facts: Facts, step_from_record: bool) -> ConsensusSnapshot {
        let version = match (facts, self.cached_version.clone()) {
            (Facts::RoundStateOnly, Some(version)) => version,
            _ => match self.reader.get_version().await {
                Some(version) => version,
                None => return self.offline(MSG_NO_VERSION),
            },
        };
        self.cached_version = Some(version.clone());

        let height = match (facts, self.cached_height) {
            (Facts::RoundStateOnly, Some(height)) => height,
            _ => match self.reader.get_block_height().await {
                Some(height) => height,
                None => return self.offline(MSG_NO_HEIGHT),
            },
        };
        self.cached_height = Some(height);

        let Some(record) = self.reader.get_round_vote_record().await else {
            return self.offline(MSG_NO_ROUND_STATE);
        };
        if step_from_record {
            if let Some(step) = &record.step {
                self.round_step = step.clone();
            }
        }

        match self.parser.tally_both(&record, &self.directory) {
            Ok((prevote, precommit)) => ConsensusSnapshot::Online(OnlineSnapshot {
                version,
                height,
                round_step: self.round_step.clone(),
                prevote,
                precommit,
            }),
            Err(e) => {
                warn!(error = %e, "round state could not be tallied");
                self.offline(MSG_BAD_ROUND_STATE)
            }
        }
    }

    fn offline(&mut self, msg: &str) -> ConsensusSnapshot {
        self.cached_version = None;
        self.cached_height = None;
        ConsensusSnapshot::offline(msg)
    }

    /// Install `next` as the current snapshot and return the one it replaced.
    fn commit(&mut self, next: ConsensusSnapshot) -> ConsensusSnapshot {
        let outcome = if next.is_online() { "online" } else { "offline" };
        self.metrics.refreshes.with_label_values(&[outcome]).inc();
        self.metrics.node_online.set(i64::from(next.is_online()));

        match (self.current.is_online(), &next) {
            (false, ConsensusSnapshot::Online(s)) => {
                info!(version = %s.version, height = s.height, "node online");
            }
            (true, ConsensusSnapshot::Offline { msg }) => {
                warn!(reason = %msg, "node offline");
            }
            _ => {}
        }
        std::mem::replace(&mut self.current, next)
    }
}
