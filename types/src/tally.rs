//! Per-vote-kind participation tally.

/// Participation for one vote kind in the current round.
///
/// `participation` is aligned to the directory the tally was computed
/// against: entry `i` is 1 iff the `i`-th validator's moniker voted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tally {
    pub participation: Vec<u8>,
    /// Voting power that has voted so far.
    pub votes_in: u64,
    /// Total voting power of the active set.
    pub total_power: u64,
    /// `votes_in / total_power` as a percentage with two decimals, e.g. `"66.67%"`.
    pub percentage: String,
}

impl Tally {
    /// A tally with nobody voted yet.
    pub fn empty(validators: usize, total_power: u64) -> Self {
        Self {
            participation: vec![0; validators],
            votes_in: 0,
            total_power,
            percentage: format_percentage(0, total_power),
        }
    }

    /// The voting-power ratio as reported upstream, e.g. `"1/2"`.
    pub fn ratio(&self) -> String {
        format!("{}/{}", self.votes_in, self.total_power)
    }

    /// Number of directory entries flagged as voted.
    pub fn voters(&self) -> usize {
        self.participation.iter().filter(|&&v| v == 1).count()
    }
}

/// Format `votes_in / total_power` as a two-decimal percentage.
///
/// Returns `"0.00%"` when nothing has voted or the total is unknown.
pub fn format_percentage(votes_in: u64, total_power: u64) -> String {
    if votes_in == 0 || total_power == 0 {
        return "0.00%".to_string();
    }
    let pct = 100.0 * (votes_in as f64) / (total_power as f64);
    format!("{pct:.2}%")
}
