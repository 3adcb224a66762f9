//! The consensus snapshot broadcast to subscribers.
//!
//! A snapshot is either online, carrying every chain fact and both tallies,
//! or offline, carrying only an explanatory message. There is no state in
//! which stale numbers travel alongside `online: false`.
//!
//! Wire shape (online):
//!
//! ```json
//! {"online":true,"version":"0.38.2","height":123,"round_step":"RoundStepPrevote",
//!  "pv_list":[0,1],"pv_percentage":"50.00%","pv_voting_power":"1/2",
//!  "pc_list":[0,0],"pc_percentage":"0.00%","pc_voting_power":"0/2"}
//! ```
//!
//! Wire shape (offline): `{"online":false,"msg":"Could not obtain block height"}`.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::round::{RoundStep, VoteKind};
use crate::tally::Tally;

/// Every fact gathered during a successful refresh cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnlineSnapshot {
    pub version: String,
    pub height: u64,
    pub round_step: RoundStep,
    pub prevote: Tally,
    pub precommit: Tally,
}

impl OnlineSnapshot {
    pub fn tally(&self, kind: VoteKind) -> &Tally {
        match kind {
            VoteKind::Prevote => &self.prevote,
            VoteKind::Precommit => &self.precommit,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsensusSnapshot {
    Online(OnlineSnapshot),
    Offline { msg: String },
}

impl ConsensusSnapshot {
    pub fn offline(msg: impl Into<String>) -> Self {
        Self::Offline { msg: msg.into() }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online(_))
    }

    pub fn as_online(&self) -> Option<&OnlineSnapshot> {
        match self {
            Self::Online(s) => Some(s),
            Self::Offline { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Online(_) => None,
            Self::Offline { msg } => Some(msg),
        }
    }
}

impl Serialize for ConsensusSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Offline { msg } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("online", &false)?;
                map.serialize_entry("msg", msg)?;
                map.end()
            }
            Self::Online(s) => {
                let mut map = serializer.serialize_map(Some(10))?;
                map.serialize_entry("online", &true)?;
                map.serialize_entry("version", &s.version)?;
                map.serialize_entry("height", &s.height)?;
                map.serialize_entry("round_step", &s.round_step)?;
                for kind in [VoteKind::Prevote, VoteKind::Precommit] {
                    let tally = s.tally(kind);
                    let prefix = kind.wire_prefix();
                    map.serialize_entry(&format!("{prefix}_list"), &tally.participation)?;
                    map.serialize_entry(&format!("{prefix}_percentage"), &tally.percentage)?;
                    map.serialize_entry(&format!("{prefix}_voting_power"), &tally.ratio())?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn online() -> ConsensusSnapshot {
        let mut prevote = Tally::empty(2, 2);
        prevote.participation = vec![0, 1];
        prevote.votes_in = 1;
        prevote.percentage = "50.00%".into();
        ConsensusSnapshot::Online(OnlineSnapshot {
            version: "0.38.2".into(),
            height: 123,
            round_step: RoundStep::Prevote,
            prevote,
            precommit: Tally::empty(2, 2),
        })
    }

    #[test]
    fn online_snapshot_wire_shape() {
        let value: Value = serde_json::to_value(online()).unwrap();
        assert_eq!(
            value,
            json!({
                "online": true,
                "version": "0.38.2",
                "height": 123,
                "round_step": "RoundStepPrevote",
                "pv_list": [0, 1],
                "pv_percentage": "50.00%",
                "pv_voting_power": "1/2",
                "pc_list": [0, 0],
                "pc_percentage": "0.00%",
                "pc_voting_power": "0/2",
            })
        );
    }

    #[test]
    fn offline_snapshot_carries_only_message() {
        let snapshot = ConsensusSnapshot::offline("Could not obtain block height");
        let value: Value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            value,
            json!({"online": false, "msg": "Could not obtain block height"})
        );
        assert!(value.get("height").is_none());
        assert!(!snapshot.is_online());
        assert_eq!(snapshot.message(), Some("Could not obtain block height"));
    }

    #[test]
    fn snapshots_compare_field_for_field() {
        let a = online();
        let mut b = online();
        assert_eq!(a, b);
        if let ConsensusSnapshot::Online(ref mut s) = b {
            s.height += 1;
        }
        assert_ne!(a, b);
    }
}
