//! Nullable subscriber: record messages instead of sending them.

use async_trait::async_trait;
use cmon_websocket::{HubError, Subscriber};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared instrumentation for concurrent sends across many subscribers.
#[derive(Default)]
pub struct SendTracker {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    started: AtomicUsize,
}

impl SendTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Forget everything observed so far.
    pub fn reset(&self) {
        self.max_in_flight
            .store(self.in_flight.load(Ordering::SeqCst), Ordering::SeqCst);
        self.started.store(0, Ordering::SeqCst);
    }

    /// Highest number of sends observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Sends started so far.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

/// A test subscriber that records every message it is sent.
pub struct NullSubscriber {
    peer: String,
    received: Mutex<Vec<String>>,
    failing: AtomicBool,
    delay: Option<Duration>,
    tracker: Option<Arc<SendTracker>>,
}

impl NullSubscriber {
    pub fn new(peer: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(peer.into(), None, None))
    }

    /// A subscriber whose sends take `delay` and report to `tracker`.
    pub fn instrumented(
        peer: impl Into<String>,
        delay: Duration,
        tracker: Arc<SendTracker>,
    ) -> Arc<Self> {
        Arc::new(Self::build(peer.into(), Some(delay), Some(tracker)))
    }

    fn build(peer: String, delay: Option<Duration>, tracker: Option<Arc<SendTracker>>) -> Self {
        Self {
            peer,
            received: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            delay,
            tracker,
        }
    }

    /// Make every following send fail as if the connection had closed.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Raw text of every delivered message, in order.
    pub fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Delivered messages parsed as JSON; unparsable text becomes `Null`.
    pub fn received_json(&self) -> Vec<serde_json::Value> {
        self.received()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap_or(serde_json::Value::Null))
            .collect()
    }

    pub fn clear(&self) {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[async_trait]
impl Subscriber for NullSubscriber {
    fn peer(&self) -> String {
        self.peer.clone()
    }

    async fn send_text(&self, text: &str) -> Result<(), HubError> {
        if let Some(tracker) = &self.tracker {
            tracker.enter();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(tracker) = &self.tracker {
            tracker.exit();
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(HubError::Closed);
        }
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }
}
