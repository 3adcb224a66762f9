//! The subscriber set and bounded-concurrency fan-out.

use async_trait::async_trait;
use cmon_types::{ConsensusSnapshot, DataSources, ServerMessage};
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::metrics::HubMetrics;
use crate::HubError;

/// Upper bound on subscriber sends in flight during one broadcast.
pub const DEFAULT_MAX_CONCURRENT_SENDS: usize = 100;

pub type SubscriberId = u64;

/// One connected client.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Peer label for logs.
    fn peer(&self) -> String;

    /// Deliver one text message.
    async fn send_text(&self, text: &str) -> Result<(), HubError>;
}

/// Outcome of one broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Subscribers whose send failed. They stay registered until their
    /// connection reports the disconnect.
    pub failed: Vec<SubscriberId>,
}

/// What a late joiner needs to catch up.
struct Greeting {
    monikers: Vec<String>,
    snapshot: ConsensusSnapshot,
    /// Bumped by every publish.
    revision: u64,
}

/// Owns the set of connected subscribers and fans messages out to them.
///
/// The set is mutated from two sides: the drive loop publishes, the
/// connection layer adds and removes. Broadcasts iterate over a copy of the
/// set taken under the lock, so concurrent joins and leaves never affect an
/// in-flight fan-out.
pub struct BroadcastHub {
    data_sources: DataSources,
    subscribers: RwLock<BTreeMap<SubscriberId, Arc<dyn Subscriber>>>,
    /// Held only to copy or replace the cache, never across a send.
    greeting: RwLock<Greeting>,
    next_id: AtomicU64,
    max_concurrent_sends: usize,
    metrics: Option<HubMetrics>,
}

impl BroadcastHub {
    pub fn new(data_sources: DataSources, max_concurrent_sends: usize) -> Self {
        Self {
            data_sources,
            subscribers: RwLock::new(BTreeMap::new()),
            greeting: RwLock::new(Greeting {
                monikers: Vec::new(),
                snapshot: ConsensusSnapshot::offline("Waiting for first update"),
                revision: 0,
            }),
            next_id: AtomicU64::new(1),
            max_concurrent_sends: max_concurrent_sends.max(1),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: HubMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn max_concurrent_sends(&self) -> usize {
        self.max_concurrent_sends
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Send a new subscriber the data sources, the current moniker list and
    /// the current snapshot, then register it.
    ///
    /// The greeting goes out before the subscriber joins the set, so a slow
    /// joiner never holds up a publish. If a publish lands while the greeting
    /// is in flight, the newer monikers and snapshot are sent again before
    /// registering; the joiner never ends on a stale snapshot. A failed
    /// greeting is logged; the subscriber is still registered.
    pub async fn add_subscriber(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let sources = ServerMessage::DataSources {
            data_sources: self.data_sources.clone(),
        };
        let mut healthy = self.greet(subscriber.as_ref(), &sources).await;
        let count = loop {
            let (revision, monikers, snapshot) = {
                let greeting = self.greeting.read().await;
                (
                    greeting.revision,
                    greeting.monikers.clone(),
                    greeting.snapshot.clone(),
                )
            };
            if healthy {
                healthy = self
                    .greet(subscriber.as_ref(), &ServerMessage::Monikers { monikers })
                    .await
                    && self
                        .greet(subscriber.as_ref(), &ServerMessage::Snapshot(snapshot))
                        .await;
            }

            // Publishes take the write lock, so none can slip in between the
            // revision check and the insert.
            let greeting = self.greeting.read().await;
            if greeting.revision == revision || !healthy {
                let mut subscribers = self.subscribers.write().await;
                subscribers.insert(id, subscriber.clone());
                break subscribers.len();
            }
            debug!(peer = %subscriber.peer(), "state changed during greeting, resending");
        };
        if let Some(m) = &self.metrics {
            m.subscribers.set(count as i64);
        }
        id
    }

    /// Send one greeting message. Returns `false` after logging a failure.
    async fn greet(&self, subscriber: &dyn Subscriber, message: &ServerMessage) -> bool {
        match subscriber.send_text(&message.to_json()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(peer = %subscriber.peer(), kind = message.kind(), error = %e, "add_subscriber: greeting failed");
                if let Some(m) = &self.metrics {
                    m.send_failures.inc();
                }
                false
            }
        }
    }

    /// Unregister a subscriber. Returns `false` if it was already gone.
    pub async fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let removed = subscribers.remove(&id).is_some();
        if let Some(m) = &self.metrics {
            m.subscribers.set(subscribers.len() as i64);
        }
        removed
    }

    /// Replace the cached snapshot and send it to every subscriber.
    pub async fn publish_snapshot(&self, snapshot: ConsensusSnapshot) -> BroadcastReport {
        let mut greeting = self.greeting.write().await;
        greeting.snapshot = snapshot.clone();
        greeting.revision += 1;
        let targets = self.targets().await;
        drop(greeting);
        self.fan_out(targets, &ServerMessage::Snapshot(snapshot)).await
    }

    /// Replace the cached moniker list and send it to every subscriber.
    pub async fn publish_monikers(&self, monikers: Vec<String>) -> BroadcastReport {
        let mut greeting = self.greeting.write().await;
        greeting.monikers = monikers.clone();
        greeting.revision += 1;
        let targets = self.targets().await;
        drop(greeting);
        self.fan_out(targets, &ServerMessage::Monikers { monikers }).await
    }

    /// Send `message` to every subscriber registered right now.
    pub async fn broadcast(&self, message: &ServerMessage) -> BroadcastReport {
        let targets = self.targets().await;
        self.fan_out(targets, message).await
    }

    async fn targets(&self) -> Vec<(SubscriberId, Arc<dyn Subscriber>)> {
        self.subscribers
            .read()
            .await
            .iter()
            .map(|(id, s)| (*id, s.clone()))
            .collect()
    }

    /// At most `max_concurrent_sends` sends are outstanding at any instant.
    async fn fan_out(
        &self,
        targets: Vec<(SubscriberId, Arc<dyn Subscriber>)>,
        message: &ServerMessage,
    ) -> BroadcastReport {
        let payload = message.to_json();
        let payload = payload.as_str();
        let sends: Vec<_> = targets
            .into_iter()
            .map(|(id, subscriber)| async move {
                let result = subscriber.send_text(payload).await;
                (id, subscriber.peer(), result)
            })
            .collect();
        let results: Vec<(SubscriberId, String, Result<(), HubError>)> = stream::iter(sends)
            .buffer_unordered(self.max_concurrent_sends)
            .collect()
            .await;

        let mut report = BroadcastReport::default();
        for (id, peer, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(subscriber = id, peer = %peer, error = %e, "broadcast: send failed");
                    report.failed.push(id);
                }
            }
        }
        report.failed.sort_unstable();

        if let Some(m) = &self.metrics {
            m.broadcasts.inc();
            m.send_failures.inc_by(report.failed.len() as u64);
        }
        debug!(
            kind = message.kind(),
            delivered = report.delivered,
            failed = report.failed.len(),
            "broadcast complete"
        );
        report
    }
}
