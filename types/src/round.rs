//! Round steps and vote kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of a single consensus round, named the way the upstream node
/// reports it (`RoundStepPrevote`, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoundStep {
    NewHeight,
    NewRound,
    #[default]
    Propose,
    Prevote,
    PrevoteWait,
    Precommit,
    PrecommitWait,
    Commit,
    /// A step name this monitor does not know about.
    Other(String),
}

impl RoundStep {
    /// Decode the numeric step from a `height/round/step` status string.
    pub fn from_step_number(n: u8) -> Option<Self> {
        Some(match n {
            1 => Self::NewHeight,
            2 => Self::NewRound,
            3 => Self::Propose,
            4 => Self::Prevote,
            5 => Self::PrevoteWait,
            6 => Self::Precommit,
            7 => Self::PrecommitWait,
            8 => Self::Commit,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NewHeight => "RoundStepNewHeight",
            Self::NewRound => "RoundStepNewRound",
            Self::Propose => "RoundStepPropose",
            Self::Prevote => "RoundStepPrevote",
            Self::PrevoteWait => "RoundStepPrevoteWait",
            Self::Precommit => "RoundStepPrecommit",
            Self::PrecommitWait => "RoundStepPrecommitWait",
            Self::Commit => "RoundStepCommit",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for RoundStep {
    fn from(s: String) -> Self {
        match s.as_str() {
            "RoundStepNewHeight" => Self::NewHeight,
            "RoundStepNewRound" => Self::NewRound,
            "RoundStepPropose" => Self::Propose,
            "RoundStepPrevote" => Self::Prevote,
            "RoundStepPrevoteWait" => Self::PrevoteWait,
            "RoundStepPrecommit" => Self::Precommit,
            "RoundStepPrecommitWait" => Self::PrecommitWait,
            "RoundStepCommit" => Self::Commit,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for RoundStep {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<RoundStep> for String {
    fn from(step: RoundStep) -> Self {
        step.as_str().to_string()
    }
}

impl fmt::Display for RoundStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two voting phases of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoteKind {
    Prevote,
    Precommit,
}

impl VoteKind {
    /// Map an upstream signed-message type (1 = prevote, 2 = precommit).
    pub fn from_signed_msg_type(t: i64) -> Option<Self> {
        match t {
            1 => Some(Self::Prevote),
            2 => Some(Self::Precommit),
            _ => None,
        }
    }

    /// The only round step during which votes of this kind change the tally
    /// subscribers are looking at.
    pub fn active_step(&self) -> RoundStep {
        match self {
            Self::Prevote => RoundStep::Prevote,
            Self::Precommit => RoundStep::Precommit,
        }
    }

    /// Field prefix in the snapshot wire format.
    pub fn wire_prefix(&self) -> &'static str {
        match self {
            Self::Prevote => "pv",
            Self::Precommit => "pc",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prevote => "prevote",
            Self::Precommit => "precommit",
        }
    }
}

impl fmt::Display for VoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
