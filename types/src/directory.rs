//! Validator identity keys and the address → moniker directory.
//!
//! The staking registry and the active validator set describe the same
//! validators with different representations. Votes only carry a clipped
//! consensus address, so the directory is keyed by that clipped prefix.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Number of consensus-address characters reported in a vote record.
pub const IDENTITY_KEY_LEN: usize = 12;

/// A consensus address clipped to [`IDENTITY_KEY_LEN`] characters and
/// upper-cased, used as the join key between votes and the directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Clip a full (or already clipped) consensus address to an identity key.
    pub fn from_address(address: &str) -> Self {
        let clipped: String = address
            .trim()
            .chars()
            .take(IDENTITY_KEY_LEN)
            .collect();
        Self(clipped.to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered mapping from identity key to moniker for the active validator set.
///
/// Iteration order is the order entries were inserted (the active set's
/// order). Participation vectors are aligned to this order, so it must not
/// change between a rebuild and the tallies computed against it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorDirectory {
    entries: Vec<(IdentityKey, String)>,
    index: HashMap<IdentityKey, usize>,
}

impl ValidatorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns `false` (and leaves the directory unchanged)
    /// if the identity key is already present.
    pub fn insert(&mut self, key: IdentityKey, moniker: impl Into<String>) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, moniker.into()));
        true
    }

    /// Look up the moniker for an identity key.
    pub fn moniker(&self, key: &IdentityKey) -> Option<&str> {
        self.index
            .get(key)
            .map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.index.contains_key(key)
    }

    /// Monikers in directory order.
    pub fn monikers(&self) -> Vec<String> {
        self.entries.iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityKey, &str)> {
        self.entries.iter().map(|(k, m)| (k, m.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(IdentityKey, String)> for ValidatorDirectory {
    fn from_iter<I: IntoIterator<Item = (IdentityKey, String)>>(iter: I) -> Self {
        let mut directory = Self::new();
        for (key, moniker) in iter {
            directory.insert(key, moniker);
        }
        directory
    }
}
