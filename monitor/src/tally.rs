//! Decoding raw vote sets into participation tallies.
//!
//! The node renders both the vote lists and the voting-power ratio as free
//! text. All text decoding lives in [`decode_ratio`] and [`parse_vote_entry`];
//! [`TallyParser`] only combines their results with the directory.

use cmon_types::tally::format_percentage;
use cmon_types::{IdentityKey, Tally, ValidatorDirectory, VoteKind};
use cmon_upstream::RoundVoteRecord;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::TallyError;
use crate::metrics::MonitorMetrics;

/// Extract `(votes_in, total)` from a bit-array status such as
/// `"BA{4:xx__} 1/2 = 0.50"`.
///
/// The ratio is the digit run directly before the first `/` that also has
/// a digit run directly after it. Digits elsewhere in the status (the
/// bitmask size, the trailing fraction) never join either side.
pub fn decode_ratio(status: &str) -> Result<(u64, u64), TallyError> {
    let bytes = status.as_bytes();
    for (slash, _) in status.match_indices('/') {
        let start = bytes[..slash]
            .iter()
            .rposition(|b| !b.is_ascii_digit())
            .map_or(0, |i| i + 1);
        let end = bytes[slash + 1..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(bytes.len(), |i| slash + 1 + i);
        let (n, m) = (&status[start..slash], &status[slash + 1..end]);
        if n.is_empty() || m.is_empty() {
            continue;
        }
        if let (Ok(n), Ok(m)) = (n.parse::<u64>(), m.parse::<u64>()) {
            return Ok((n, m));
        }
    }
    Err(TallyError::MalformedRatio(status.to_string()))
}

/// One slot of a prevote/precommit list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteEntry {
    /// No vote from this slot (`null`, `"nil-Vote"`, empty).
    Nil,
    /// A vote by the validator with this identity key.
    Cast(IdentityKey),
    /// Text that is neither a sentinel nor a recognisable vote.
    Malformed(String),
}

/// Classify one raw vote entry.
///
/// A vote renders as `Vote{0:AAA111111111 100/00/...}`: the validator
/// address follows the first `:` and runs to the next whitespace.
pub fn parse_vote_entry(entry: Option<&str>) -> VoteEntry {
    let Some(text) = entry.map(str::trim) else {
        return VoteEntry::Nil;
    };
    if text.is_empty() || text.to_ascii_lowercase().starts_with("nil") {
        return VoteEntry::Nil;
    }
    let address = text
        .split_once(':')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .map(|a| a.trim_end_matches('}'))
        .filter(|a| !a.is_empty());
    match address {
        Some(address) => VoteEntry::Cast(IdentityKey::from_address(address)),
        None => VoteEntry::Malformed(text.to_string()),
    }
}

/// Turns round vote records into [`Tally`] values against a directory.
pub struct TallyParser {
    metrics: MonitorMetrics,
}

impl TallyParser {
    pub fn new(metrics: MonitorMetrics) -> Self {
        Self { metrics }
    }

    /// Tally one vote kind.
    ///
    /// The participation vector follows the directory's iteration order and
    /// flags every validator whose moniker appears among the decoded votes.
    /// Unknown identity keys are logged and skipped.
    pub fn tally(
        &self,
        record: &RoundVoteRecord,
        kind: VoteKind,
        directory: &ValidatorDirectory,
    ) -> Result<Tally, TallyError> {
        let (votes_in, total_power) = decode_ratio(record.bit_array(kind))?;
        if votes_in == 0 {
            return Ok(Tally::empty(directory.len(), total_power));
        }
        if total_power == 0 {
            return Err(TallyError::ZeroTotalPower { votes_in });
        }

        let mut voted: HashSet<&str> = HashSet::new();
        for entry in record.votes(kind) {
            match parse_vote_entry(entry.as_deref()) {
                VoteEntry::Nil => {}
                VoteEntry::Cast(key) => match directory.moniker(&key) {
                    Some(moniker) => {
                        voted.insert(moniker);
                    }
                    None => {
                        warn!(kind = %kind, identity_key = %key, "vote from validator not in directory");
                        self.metrics
                            .lookup_misses
                            .with_label_values(&[kind.as_str()])
                            .inc();
                    }
                },
                VoteEntry::Malformed(text) => {
                    debug!(kind = %kind, entry = %text, "skipping unrecognised vote entry");
                }
            }
        }

        let participation = directory
            .iter()
            .map(|(_, moniker)| u8::from(voted.contains(moniker)))
            .collect();
        Ok(Tally {
            participation,
            votes_in,
            total_power,
            percentage: format_percentage(votes_in, total_power),
        })
    }

    /// Prevote and precommit tallies for one record.
    pub fn tally_both(
        &self,
        record: &RoundVoteRecord,
        directory: &ValidatorDirectory,
    ) -> Result<(Tally, Tally), TallyError> {
        Ok((
            self.tally(record, VoteKind::Prevote, directory)?,
            self.tally(record, VoteKind::Precommit, directory)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn directory() -> ValidatorDirectory {
        [
            (IdentityKey::from_address("AAA111111111"), "Val1".to_string()),
            (IdentityKey::from_address("BBB222222222"), "Val2".to_string()),
        ]
        .into_iter()
        .collect()
    }

    fn parser() -> TallyParser {
        TallyParser::new(MonitorMetrics::unregistered())
    }

    fn record(prevotes: &[Option<&str>], prevote_status: &str) -> RoundVoteRecord {
        RoundVoteRecord {
            prevotes: prevotes.iter().map(|v| v.map(str::to_string)).collect(),
            prevotes_bit_array: prevote_status.to_string(),
            precommits_bit_array: "BA{2:__} 0/2 = 0.00".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn ratio_embedded_in_status() {
        assert_eq!(decode_ratio("BA{2:_x} 1/2 = 0.50").unwrap(), (1, 2));
        assert_eq!(
            decode_ratio("BA{100:xxx} 123456/234567 = 0.53").unwrap(),
            (123456, 234567)
        );
    }

    #[test]
    fn ratio_with_annotation_characters() {
        assert_eq!(decode_ratio("power:[7/9]").unwrap(), (7, 9));
    }

    #[test]
    fn ratio_glued_to_annotation_keeps_its_own_digits() {
        assert_eq!(decode_ratio("BA{4:xx__}2/4 = 0.50").unwrap(), (2, 4));
        assert_eq!(decode_ratio("v1:3/4").unwrap(), (3, 4));
        assert_eq!(decode_ratio("a/b 5/6").unwrap(), (5, 6));
    }

    #[test]
    fn lone_slash_is_malformed() {
        assert!(decode_ratio("BA{4:xx__} / = 0.50").is_err());
        assert!(decode_ratio("1/ /2").is_err());
    }

    #[test]
    fn missing_ratio_is_malformed() {
        assert!(matches!(
            decode_ratio("BA{2:__} = 0.00"),
            Err(TallyError::MalformedRatio(_))
        ));
        assert!(decode_ratio("").is_err());
    }

    #[test]
    fn vote_entries() {
        assert_eq!(parse_vote_entry(None), VoteEntry::Nil);
        assert_eq!(parse_vote_entry(Some("nil-Vote")), VoteEntry::Nil);
        assert_eq!(parse_vote_entry(Some("")), VoteEntry::Nil);
        assert_eq!(
            parse_vote_entry(Some("Vote{0:aaa111111111ffff 100/00/1(Prevote) 8F2A}")),
            VoteEntry::Cast(IdentityKey::from_address("AAA111111111"))
        );
        assert!(matches!(
            parse_vote_entry(Some("garbage")),
            VoteEntry::Malformed(_)
        ));
    }

    #[test]
    fn vector_follows_directory_order() {
        // Active-set order puts Val2 first.
        let directory: ValidatorDirectory = [
            (IdentityKey::from_address("BBB222222222"), "Val2".to_string()),
            (IdentityKey::from_address("AAA111111111"), "Val1".to_string()),
        ]
        .into_iter()
        .collect();
        let rec = record(&[Some("nil-Vote"), Some("Vote:AAA111111111 ...")], "... 1/2 ...");
        let tally = parser().tally(&rec, VoteKind::Prevote, &directory).unwrap();
        assert_eq!(tally.participation, vec![0, 1]);
        assert_eq!(tally.percentage, "50.00%");
        assert_eq!(tally.ratio(), "1/2");
    }

    #[test]
    fn zero_votes_in_skips_the_vote_list() {
        // The list claims a vote, but the ratio says nothing is in yet.
        let rec = record(&[Some("Vote:AAA111111111 x")], "BA{2:__} 0/2 = 0.00");
        let tally = parser()
            .tally(&rec, VoteKind::Prevote, &directory())
            .unwrap();
        assert_eq!(tally.participation, vec![0, 0]);
        assert_eq!(tally.percentage, "0.00%");
        assert_eq!(tally.ratio(), "0/2");
    }

    #[test]
    fn zero_total_power_fails_the_tally() {
        let rec = record(&[Some("Vote:AAA111111111 x")], "3/0");
        assert_eq!(
            parser().tally(&rec, VoteKind::Prevote, &directory()),
            Err(TallyError::ZeroTotalPower { votes_in: 3 })
        );
    }

    #[test]
    fn unknown_validator_is_skipped_and_counted() {
        let metrics = MonitorMetrics::unregistered();
        let parser = TallyParser::new(metrics.clone());
        let rec = record(
            &[Some("Vote:CCC333333333 x"), Some("Vote:AAA111111111 x")],
            "2/3",
        );
        let tally = parser.tally(&rec, VoteKind::Prevote, &directory()).unwrap();
        assert_eq!(tally.participation, vec![1, 0]);
        assert_eq!(
            metrics.lookup_misses.with_label_values(&["prevote"]).get(),
            1
        );
    }

    #[test]
    fn distinct_sentinels_never_count() {
        let rec = record(&[None, Some("nil-Vote"), Some("  ")], "1/2");
        let tally = parser()
            .tally(&rec, VoteKind::Prevote, &directory())
            .unwrap();
        assert_eq!(tally.voters(), 0);
        assert_eq!(tally.percentage, "50.00%");
    }

    #[test]
    fn precommit_reads_its_own_lists() {
        let rec = RoundVoteRecord {
            precommits: vec![Some("Vote:AAA111111111 x".into()), None],
            precommits_bit_array: "BA{2:x_} 1/2 = 0.50".into(),
            prevotes_bit_array: "BA{2:__} 0/2 = 0.00".into(),
            ..Default::default()
        };
        let (pv, pc) = parser().tally_both(&rec, &directory()).unwrap();
        assert_eq!(pv.participation, vec![0, 0]);
        assert_eq!(pc.participation, vec![1, 0]);
    }

    proptest! {
        #[test]
        fn ratio_survives_surrounding_noise(
            n in 0u64..1_000_000,
            m in 1u64..1_000_000,
            prefix in "[A-Za-z{}:_x]{0,8}",
        ) {
            let status = format!("{prefix} {n}/{m} = 0.5");
            prop_assert_eq!(decode_ratio(&status).unwrap(), (n, m));
        }

        #[test]
        fn ratio_glued_to_a_bitmask(
            n in 0u64..1_000_000,
            m in 1u64..1_000_000,
            size in 0u32..200,
            mask in "[x_]{0,12}",
            lead in "[A-Za-z0-9:]{0,4}",
        ) {
            let status = format!("{lead}BA{{{size}:{mask}}}{n}/{m} = 0.{size}");
            prop_assert_eq!(decode_ratio(&status).unwrap(), (n, m));
        }

        #[test]
        fn zero_votes_give_an_all_zero_vector(total in 0u64..u32::MAX as u64, slots in 0usize..8) {
            let votes: Vec<Option<&str>> = vec![Some("Vote:AAA111111111 x"); slots];
            let rec = record(&votes, &format!("0/{total}"));
            let tally = parser().tally(&rec, VoteKind::Prevote, &directory()).unwrap();
            prop_assert!(tally.participation.iter().all(|&v| v == 0));
            prop_assert_eq!(tally.percentage, "0.00%");
        }

        #[test]
        fn full_votes_are_one_hundred_percent(total in 1u64..u32::MAX as u64) {
            let rec = record(&[Some("Vote:AAA111111111 x")], &format!("{total}/{total}"));
            let tally = parser().tally(&rec, VoteKind::Prevote, &directory()).unwrap();
            prop_assert_eq!(tally.percentage, "100.00%");
        }
    }
}
