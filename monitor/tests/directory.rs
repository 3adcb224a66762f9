use cmon_monitor::{directory, MonitorError};
use cmon_nullables::NullChainSource;
use cmon_types::IdentityKey;
use cmon_upstream::{ActiveValidator, StakingValidator};

fn staking(pub_key: &str, moniker: &str) -> StakingValidator {
    StakingValidator {
        consensus_pubkey: pub_key.into(),
        moniker: moniker.into(),
    }
}

fn active(address: &str, pub_key: &str) -> ActiveValidator {
    ActiveValidator {
        address: address.into(),
        pub_key: pub_key.into(),
    }
}

#[tokio::test]
async fn joins_registry_and_active_set_on_pubkey() {
    let source = NullChainSource::with_validators(&[
        ("AAA111111111FFFFFFFF", "pk-a", "Val1"),
        ("BBB222222222EEEEEEEE", "pk-b", "Val2"),
    ]);
    let dir = directory::rebuild(&source).await.unwrap();
    assert_eq!(dir.monikers(), vec!["Val1", "Val2"]);
    assert_eq!(
        dir.moniker(&IdentityKey::from_address("AAA111111111")),
        Some("Val1")
    );
}

#[tokio::test]
async fn follows_every_page_of_both_queries() {
    let source = NullChainSource::new();
    source.set_staking_pages(vec![
        vec![staking("pk-a", "Val1")],
        vec![staking("pk-b", "Val2")],
        vec![staking("pk-c", "Val3")],
    ]);
    source.set_active_pages(vec![
        vec![active("CCC333333333", "pk-c"), active("AAA111111111", "pk-a")],
        vec![active("BBB222222222", "pk-b")],
    ]);

    let dir = directory::rebuild(&source).await.unwrap();
    assert_eq!(dir.monikers(), vec!["Val3", "Val1", "Val2"]);
    assert_eq!(source.calls("staking_validators"), 3);
    // Two pages reach the reported total; no third request.
    assert_eq!(source.calls("active_validators"), 2);
}

#[tokio::test]
async fn rebuild_is_idempotent_on_unchanged_data() {
    let source = NullChainSource::with_validators(&[
        ("AAA111111111", "pk-a", "Val1"),
        ("BBB222222222", "pk-b", "Val2"),
    ]);
    let first = directory::rebuild(&source).await.unwrap();
    let second = directory::rebuild(&source).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn unregistered_validator_is_labelled_with_its_key() {
    let source = NullChainSource::new();
    source.set_staking_pages(vec![vec![staking("pk-a", "Val1")]]);
    source.set_active_pages(vec![vec![
        active("AAA111111111", "pk-a"),
        active("ddd444444444", "pk-unknown"),
    ]]);
    let dir = directory::rebuild(&source).await.unwrap();
    assert_eq!(dir.monikers(), vec!["Val1", "DDD444444444"]);
}

#[tokio::test]
async fn duplicate_identity_keys_keep_the_first() {
    let source = NullChainSource::new();
    source.set_staking_pages(vec![vec![staking("pk-a", "Val1"), staking("pk-b", "Val2")]]);
    source.set_active_pages(vec![vec![
        active("AAA111111111XXXX", "pk-a"),
        active("AAA111111111YYYY", "pk-b"),
    ]]);
    let dir = directory::rebuild(&source).await.unwrap();
    assert_eq!(dir.len(), 1);
    assert_eq!(dir.monikers(), vec!["Val1"]);
}

#[tokio::test]
async fn unreachable_registry_is_a_directory_error() {
    let source = NullChainSource::with_validators(&[("AAA111111111", "pk-a", "Val1")]);
    source.set_directory_reachable(false);
    let result = directory::rebuild(&source).await;
    assert!(matches!(result, Err(MonitorError::Directory(_))));
}

#[tokio::test]
async fn empty_active_set_is_a_directory_error() {
    let source = NullChainSource::new();
    let result = directory::rebuild(&source).await;
    assert!(matches!(result, Err(MonitorError::Directory(_))));
}
