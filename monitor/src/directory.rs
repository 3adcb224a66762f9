//! Building the validator directory from the staking registry and the
//! active validator set.

use cmon_types::{IdentityKey, ValidatorDirectory};
use cmon_upstream::{ActiveValidator, ChainSource};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::MonitorError;

/// Upper bound on active-set pages, in case the node keeps reporting a
/// total it never delivers.
const MAX_ACTIVE_SET_PAGES: u32 = 1_000;

/// Build a fresh directory: identity key → moniker, ordered like the active set.
///
/// Any upstream failure is returned as [`MonitorError::Directory`]. Active
/// validators missing from the staking registry are labelled with their
/// identity key; duplicate identity keys keep the first occurrence.
pub async fn rebuild(source: &dyn ChainSource) -> Result<ValidatorDirectory, MonitorError> {
    let monikers = staking_monikers(source).await?;
    let active = active_set(source).await?;
    if active.is_empty() {
        return Err(MonitorError::Directory("active validator set is empty".into()));
    }

    let mut directory = ValidatorDirectory::new();
    for validator in active {
        let key = IdentityKey::from_address(&validator.address);
        let moniker = match monikers.get(&validator.pub_key) {
            Some(moniker) => moniker.clone(),
            None => {
                warn!(identity_key = %key, "active validator missing from staking registry");
                key.to_string()
            }
        };
        if !directory.insert(key.clone(), moniker) {
            warn!(identity_key = %key, "duplicate identity key, keeping first entry");
        }
    }

    info!(
        registry = monikers.len(),
        directory = directory.len(),
        "validator directory built"
    );
    Ok(directory)
}

/// Consensus public key → moniker for every registered validator.
async fn staking_monikers(
    source: &dyn ChainSource,
) -> Result<HashMap<String, String>, MonitorError> {
    let mut monikers = HashMap::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = source
            .staking_validators(cursor.as_deref())
            .await
            .map_err(|e| MonitorError::Directory(format!("staking registry: {e}")))?;
        debug!(entries = page.validators.len(), "staking registry page");
        for validator in page.validators {
            monikers
                .entry(validator.consensus_pubkey)
                .or_insert(validator.moniker);
        }
        match page.next_key {
            Some(key) if !key.is_empty() => cursor = Some(key),
            _ => break,
        }
    }
    Ok(monikers)
}

/// The active validator set, in the order the node reports it.
async fn active_set(source: &dyn ChainSource) -> Result<Vec<ActiveValidator>, MonitorError> {
    let mut validators = Vec::new();
    let mut read = 0u64;
    for page in 1..=MAX_ACTIVE_SET_PAGES {
        let set = source
            .active_validators(page)
            .await
            .map_err(|e| MonitorError::Directory(format!("active validator set: {e}")))?;
        debug!(page, count = set.count, total = set.total, "active set page");
        if set.validators.is_empty() {
            if read < set.total {
                warn!(read, total = set.total, "active set page was empty before total was reached");
            }
            break;
        }
        read += set.validators.len() as u64;
        validators.extend(set.validators);
        if read >= set.total {
            break;
        }
    }
    Ok(validators)
}
