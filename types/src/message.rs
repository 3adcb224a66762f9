//! JSON messages sent to subscribers.

use serde::{Deserialize, Serialize};

use crate::snapshot::ConsensusSnapshot;

/// The upstream endpoints this monitor reads from, sent to every new subscriber.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSources {
    pub api: String,
    pub rpc: String,
}

/// A message on the subscriber channel.
///
/// - `{"data_sources": {"api": ..., "rpc": ...}}` once at connect time
/// - `{"monikers": [...]}` at connect time and after every directory rebuild
/// - a [`ConsensusSnapshot`] on every published update
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    DataSources { data_sources: DataSources },
    Monikers { monikers: Vec<String> },
    Snapshot(ConsensusSnapshot),
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        // Every variant is made of strings, integers and sequences.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataSources { .. } => "data_sources",
            Self::Monikers { .. } => "monikers",
            Self::Snapshot(_) => "snapshot",
        }
    }
}

impl From<ConsensusSnapshot> for ServerMessage {
    fn from(snapshot: ConsensusSnapshot) -> Self {
        Self::Snapshot(snapshot)
    }
}
