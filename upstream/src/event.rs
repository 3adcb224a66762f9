//! Consensus events pushed by the RPC websocket.

use cmon_types::{RoundStep, VoteKind};
use serde::Deserialize;
use serde_json::Value;

use crate::UpstreamError;

/// Event classes the monitor subscribes to, in subscription order.
const EVENT_QUERIES: [&str; 3] = [
    "tm.event='Vote'",
    "tm.event='NewRoundStep'",
    "tm.event='ValidatorSetUpdates'",
];

/// A decoded upstream event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    /// A validator cast a prevote or precommit.
    Vote {
        kind: VoteKind,
        validator_address: String,
    },
    /// Consensus moved to a new round step.
    NewRoundStep {
        height: u64,
        round: u32,
        step: RoundStep,
    },
    /// The active validator set changed.
    ValidatorSetUpdates,
}

impl ChainEvent {
    /// Event class label for logs and metrics.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Vote { .. } => "vote",
            Self::NewRoundStep { .. } => "new_round_step",
            Self::ValidatorSetUpdates => "validator_set_updates",
        }
    }
}

/// JSON-RPC subscribe requests for vote, round-step and validator-set events.
pub fn subscription_requests() -> Vec<String> {
    EVENT_QUERIES
        .iter()
        .enumerate()
        .map(|(i, query)| {
            serde_json::json!({
                "jsonrpc": "2.0",
                "method": "subscribe",
                "params": [query],
                "id": i + 1,
            })
            .to_string()
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<EventResult>,
}

#[derive(Debug, Deserialize)]
struct EventResult {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    data: Option<EventData>,
}

#[derive(Debug, Deserialize)]
struct EventData {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct VoteValue {
    #[serde(rename = "Vote")]
    vote: VoteJson,
}

#[derive(Debug, Deserialize)]
struct VoteJson {
    #[serde(rename = "type")]
    msg_type: i64,
    validator_address: String,
}

#[derive(Debug, Deserialize)]
struct RoundStepValue {
    height: Value,
    #[serde(default)]
    round: u32,
    step: String,
}

/// Decode one text frame from the event websocket.
///
/// Returns `Ok(None)` for frames that are not events (subscription
/// acknowledgements) and for votes of a type the monitor does not tally.
pub fn parse_event(text: &str) -> Result<Option<ChainEvent>, UpstreamError> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| UpstreamError::InvalidResponse(format!("event frame: {e}")))?;
    let Some(EventResult {
        query: Some(query),
        data,
    }) = envelope.result
    else {
        return Ok(None);
    };
    let value = data
        .map(|d| d.value)
        .ok_or(UpstreamError::MissingField("result.data.value"))?;

    let event = match event_name(&query) {
        Some("Vote") => {
            let vote: VoteValue = decode_value(value, "Vote")?;
            match VoteKind::from_signed_msg_type(vote.vote.msg_type) {
                Some(kind) => ChainEvent::Vote {
                    kind,
                    validator_address: vote.vote.validator_address,
                },
                None => return Ok(None),
            }
        }
        Some("NewRoundStep") => {
            let rs: RoundStepValue = decode_value(value, "NewRoundStep")?;
            ChainEvent::NewRoundStep {
                height: value_as_u64(&rs.height)
                    .ok_or(UpstreamError::MissingField("NewRoundStep.height"))?,
                round: rs.round,
                step: RoundStep::from(rs.step),
            }
        }
        Some("ValidatorSetUpdates") => ChainEvent::ValidatorSetUpdates,
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// `tm.event='Vote'` → `Vote`.
fn event_name(query: &str) -> Option<&str> {
    query.split('=').nth(1).map(|s| s.trim().trim_matches('\''))
}

fn decode_value<T: serde::de::DeserializeOwned>(
    value: Value,
    what: &str,
) -> Result<T, UpstreamError> {
    serde_json::from_value(value)
        .map_err(|e| UpstreamError::InvalidResponse(format!("{what} event: {e}")))
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_subscriptions_in_order() {
        let reqs = subscription_requests();
        assert_eq!(reqs.len(), 3);
        let first: Value = serde_json::from_str(&reqs[0]).unwrap();
        assert_eq!(first["method"], "subscribe");
        assert_eq!(first["params"][0], "tm.event='Vote'");
        assert_eq!(first["id"], 1);
        let third: Value = serde_json::from_str(&reqs[2]).unwrap();
        assert_eq!(third["params"][0], "tm.event='ValidatorSetUpdates'");
        assert_eq!(third["id"], 3);
    }

    #[test]
    fn acknowledgement_is_not_an_event() {
        let ack = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        assert_eq!(parse_event(ack).unwrap(), None);
    }

    #[test]
    fn prevote_event() {
        let frame = r#"{"jsonrpc":"2.0","id":1,"result":{
            "query":"tm.event='Vote'",
            "data":{"type":"tendermint/event/Vote","value":{"Vote":{
                "type":1,"height":"100","round":0,
                "validator_address":"AAA111111111FFFFFFFFFFFFFFFFFFFFFFFFFFFF"}}}}}"#;
        assert_eq!(
            parse_event(frame).unwrap(),
            Some(ChainEvent::Vote {
                kind: VoteKind::Prevote,
                validator_address: "AAA111111111FFFFFFFFFFFFFFFFFFFFFFFFFFFF".into(),
            })
        );
    }

    #[test]
    fn proposal_typed_vote_is_ignored() {
        let frame = r#"{"result":{"query":"tm.event='Vote'",
            "data":{"value":{"Vote":{"type":32,"validator_address":"AAA"}}}}}"#;
        assert_eq!(parse_event(frame).unwrap(), None);
    }

    #[test]
    fn new_round_step_event() {
        let frame = r#"{"result":{"query":"tm.event='NewRoundStep'",
            "data":{"type":"tendermint/event/RoundState",
                    "value":{"height":"101","round":2,"step":"RoundStepPrecommit"}}}}"#;
        assert_eq!(
            parse_event(frame).unwrap(),
            Some(ChainEvent::NewRoundStep {
                height: 101,
                round: 2,
                step: RoundStep::Precommit,
            })
        );
    }

    #[test]
    fn validator_set_updates_event() {
        let frame = r#"{"result":{"query":"tm.event='ValidatorSetUpdates'",
            "data":{"value":{"validator_updates":[]}}}}"#;
        assert_eq!(
            parse_event(frame).unwrap(),
            Some(ChainEvent::ValidatorSetUpdates)
        );
    }

    #[test]
    fn malformed_vote_payload_is_an_error() {
        let frame = r#"{"result":{"query":"tm.event='Vote'","data":{"value":{"Vote":{}}}}}"#;
        assert!(parse_event(frame).is_err());
        assert!(parse_event("not json").is_err());
    }
}
