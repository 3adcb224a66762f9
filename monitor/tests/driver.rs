use cmon_monitor::{MonitorConfig, MonitorDriver, MonitorError, MonitorMetrics, ShutdownController};
use cmon_nullables::{NullChainSource, NullSubscriber};
use cmon_types::RoundStep;
use cmon_upstream::{ChainEvent, ChainSource};
use cmon_websocket::BroadcastHub;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn config() -> MonitorConfig {
    MonitorConfig {
        api_url: "null://api".into(),
        rpc_url: "null://rpc".into(),
        poll_interval_ms: 10,
        offline_poll_interval_ms: 50,
        ..Default::default()
    }
}

async fn setup() -> (Arc<NullChainSource>, Arc<BroadcastHub>, MonitorDriver) {
    let source = Arc::new(NullChainSource::with_validators(&[
        ("AAA111111111", "pk-a", "Val1"),
        ("BBB222222222", "pk-b", "Val2"),
    ]));
    let hub = Arc::new(BroadcastHub::new(source.data_sources(), 10));
    let driver = MonitorDriver::bootstrap(
        source.clone(),
        hub.clone(),
        MonitorMetrics::unregistered(),
        &config(),
    )
    .await
    .expect("bootstrap");
    (source, hub, driver)
}

#[tokio::test]
async fn bootstrap_fails_without_a_directory() {
    let source = Arc::new(NullChainSource::with_validators(&[("AAA111111111", "pk-a", "Val1")]));
    source.set_directory_reachable(false);
    let hub = Arc::new(BroadcastHub::new(source.data_sources(), 10));
    let result =
        MonitorDriver::bootstrap(source, hub, MonitorMetrics::unregistered(), &config()).await;
    assert!(matches!(result, Err(MonitorError::Directory(_))));
}

#[tokio::test]
async fn late_joiner_gets_sources_monikers_and_snapshot() {
    let (_, hub, mut driver) = setup().await;
    driver.poll_once().await;

    let sub = NullSubscriber::new("late");
    hub.add_subscriber(sub.clone()).await;
    let received = sub.received_json();
    assert_eq!(received.len(), 3);
    assert_eq!(
        received[0],
        json!({"data_sources": {"api": "null://api", "rpc": "null://rpc"}})
    );
    assert_eq!(received[1], json!({"monikers": ["Val1", "Val2"]}));
    assert_eq!(received[2]["online"], json!(true));
    assert_eq!(received[2]["height"], json!(1));
}

#[tokio::test]
async fn polling_publishes_only_changes_and_backs_off_when_offline() {
    let (source, hub, mut driver) = setup().await;
    let sub = NullSubscriber::new("s");
    hub.add_subscriber(sub.clone()).await;
    sub.clear();

    assert_eq!(driver.poll_once().await, Duration::from_millis(10));
    assert_eq!(driver.poll_once().await, Duration::from_millis(10));
    assert_eq!(sub.received().len(), 1);

    source.set_version(None);
    assert_eq!(driver.poll_once().await, Duration::from_millis(50));
    let received = sub.received_json();
    assert_eq!(received.len(), 2);
    assert_eq!(
        received[1],
        json!({"online": false, "msg": "Could not obtain node version"})
    );
}

#[tokio::test]
async fn validator_set_change_reaches_subscribers_in_order() {
    let (source, hub, mut driver) = setup().await;
    let sub = NullSubscriber::new("s");
    hub.add_subscriber(sub.clone()).await;
    sub.clear();

    source.set_validators(&[("CCC333333333", "pk-c", "Val3")]);
    driver.handle_event(ChainEvent::ValidatorSetUpdates).await;

    let received = sub.received_json();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0], json!({"monikers": ["Val3"]}));
    assert_eq!(received[1]["pv_list"], json!([0]));

    // A joiner after the change sees the new list.
    let late = NullSubscriber::new("late");
    hub.add_subscriber(late.clone()).await;
    assert_eq!(late.received_json()[1], json!({"monikers": ["Val3"]}));
}

#[tokio::test]
async fn event_loop_publishes_initial_state_then_events() {
    let (_, hub, driver) = setup().await;
    let sub = NullSubscriber::new("s");
    hub.add_subscriber(sub.clone()).await;
    sub.clear();

    let (tx, rx) = mpsc::channel(8);
    tx.send(ChainEvent::NewRoundStep {
        height: 1,
        round: 0,
        step: RoundStep::Prevote,
    })
    .await
    .unwrap();
    drop(tx);

    let controller = ShutdownController::new();
    tokio::time::timeout(Duration::from_secs(5), driver.run_events(rx, controller.signal()))
        .await
        .expect("loop ends when the channel closes");

    let received = sub.received_json();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1]["round_step"], json!("RoundStepPrevote"));
}

#[tokio::test]
async fn polled_loop_stops_on_shutdown() {
    let (_, _, driver) = setup().await;
    let controller = ShutdownController::new();
    let signal = controller.signal();
    let handle = tokio::spawn(driver.run_polled(signal));
    tokio::time::sleep(Duration::from_millis(30)).await;
    controller.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops")
        .expect("task completes");
}

#[tokio::test]
async fn stop_during_a_slow_cycle_still_publishes_it() {
    let (source, hub, driver) = setup().await;
    let sub = NullSubscriber::new("s");
    hub.add_subscriber(sub.clone()).await;
    sub.clear();
    source.set_latency(Some(Duration::from_millis(100)));

    let controller = ShutdownController::new();
    let drive = tokio::spawn(driver.run_polled(controller.signal()));
    // Stop while the version query is still outstanding.
    let stop = tokio::time::sleep(Duration::from_millis(30));
    tokio::time::timeout(Duration::from_secs(5), controller.supervise(stop, drive))
        .await
        .expect("supervise returns");

    let received = sub.received_json();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["online"], json!(true));
    assert_eq!(source.calls("round_vote_record"), 1);
}

#[tokio::test]
async fn stop_during_the_first_event_refresh_still_publishes_it() {
    let (source, hub, driver) = setup().await;
    let sub = NullSubscriber::new("s");
    hub.add_subscriber(sub.clone()).await;
    sub.clear();
    source.set_latency(Some(Duration::from_millis(100)));

    let controller = ShutdownController::new();
    let (_tx, rx) = mpsc::channel(4);
    let drive = tokio::spawn(driver.run_events(rx, controller.signal()));
    let stop = tokio::time::sleep(Duration::from_millis(30));
    controller.supervise(stop, drive).await;

    assert_eq!(sub.received_json().len(), 1);
    assert_eq!(sub.received_json()[0]["online"], json!(true));
}
