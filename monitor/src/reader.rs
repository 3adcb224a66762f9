//! Point-in-time chain facts, each fetched independently.
//!
//! Every getter returns `None` on failure after logging it with the name of
//! the operation. Nothing here propagates an error: a missing fact is a
//! cycle-local condition the aggregator turns into an offline snapshot.

use cmon_types::DataSources;
use cmon_upstream::{ChainSource, RoundVoteRecord, UpstreamError};
use std::sync::Arc;
use tracing::warn;

use crate::metrics::MonitorMetrics;

pub struct ChainStateReader {
    source: Arc<dyn ChainSource>,
    metrics: MonitorMetrics,
}

impl ChainStateReader {
    pub fn new(source: Arc<dyn ChainSource>, metrics: MonitorMetrics) -> Self {
        Self { source, metrics }
    }

    /// The underlying source, for directory rebuilds.
    pub fn source(&self) -> &dyn ChainSource {
        self.source.as_ref()
    }

    pub fn data_sources(&self) -> DataSources {
        self.source.data_sources()
    }

    pub async fn get_version(&self) -> Option<String> {
        let result = self.source.node_version().await;
        self.settle("get_version", result)
    }

    pub async fn get_block_height(&self) -> Option<u64> {
        let result = self.source.block_height().await;
        self.settle("get_block_height", result)
    }

    /// Vote sets for the first height entry of the consensus state.
    pub async fn get_round_vote_record(&self) -> Option<RoundVoteRecord> {
        let result = self.source.round_vote_record().await;
        self.settle("get_round_vote_record", result)
    }

    fn settle<T>(&self, operation: &'static str, result: Result<T, UpstreamError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(operation, error = %e, "upstream query failed");
                self.metrics
                    .upstream_failures
                    .with_label_values(&[operation])
                    .inc();
                None
            }
        }
    }
}
