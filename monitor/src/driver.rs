//! The top-level drive loop.
//!
//! Two strategies share one aggregator and one hub:
//! - [`MonitorDriver::run_polled`] refreshes on a timer and publishes only
//!   changed snapshots.
//! - [`MonitorDriver::run_events`] refreshes on each upstream event and
//!   publishes whatever the aggregator returns for it.

use cmon_types::ServerMessage;
use cmon_upstream::{ChainEvent, ChainSource};
use cmon_websocket::BroadcastHub;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::aggregator::StateAggregator;
use crate::config::MonitorConfig;
use crate::directory;
use crate::metrics::MonitorMetrics;
use crate::reader::ChainStateReader;
use crate::shutdown::ShutdownSignal;
use crate::MonitorError;

pub struct MonitorDriver {
    aggregator: StateAggregator,
    hub: Arc<BroadcastHub>,
    poll_interval: Duration,
    offline_poll_interval: Duration,
}

impl MonitorDriver {
    /// Build the validator directory and prime the hub's moniker list.
    ///
    /// A directory failure here is fatal: nothing can be labelled without it.
    pub async fn bootstrap(
        source: Arc<dyn ChainSource>,
        hub: Arc<BroadcastHub>,
        metrics: MonitorMetrics,
        config: &MonitorConfig,
    ) -> Result<Self, MonitorError> {
        let directory = directory::rebuild(source.as_ref()).await?;
        hub.publish_monikers(directory.monikers()).await;

        let reader = ChainStateReader::new(source, metrics.clone());
        Ok(Self {
            aggregator: StateAggregator::new(reader, directory, metrics),
            hub,
            poll_interval: config.poll_interval(),
            offline_poll_interval: config.offline_poll_interval(),
        })
    }

    pub fn aggregator(&self) -> &StateAggregator {
        &self.aggregator
    }

    /// One polled cycle. Returns how long to wait before the next one.
    pub async fn poll_once(&mut self) -> Duration {
        if let Some(snapshot) = self.aggregator.refresh_polled().await {
            self.hub.publish_snapshot(snapshot).await;
        }
        if self.aggregator.snapshot().is_online() {
            self.poll_interval
        } else {
            self.offline_poll_interval
        }
    }

    /// Poll until shutdown. A cycle in progress always completes.
    pub async fn run_polled(mut self, shutdown: ShutdownSignal) {
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "polled drive loop started"
        );
        let stop = shutdown.clone().triggered();
        tokio::pin!(stop);
        while !shutdown.is_triggered() {
            let delay = self.poll_once().await;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut stop => break,
            }
        }
        info!("polled drive loop stopped");
    }

    /// Apply one event and publish the resulting messages in order.
    pub async fn handle_event(&mut self, event: ChainEvent) {
        let messages = self.aggregator.refresh_on_event(event).await;
        for message in messages {
            match message {
                ServerMessage::Snapshot(snapshot) => {
                    self.hub.publish_snapshot(snapshot).await;
                }
                ServerMessage::Monikers { monikers } => {
                    self.hub.publish_monikers(monikers).await;
                }
                other => {
                    self.hub.broadcast(&other).await;
                }
            }
        }
    }

    /// Consume events until the channel closes or shutdown is triggered.
    ///
    /// One full refresh is published first so subscribers do not wait for
    /// the first event.
    pub async fn run_events(
        mut self,
        mut events: mpsc::Receiver<ChainEvent>,
        shutdown: ShutdownSignal,
    ) {
        info!("event drive loop started");
        self.poll_once().await;

        let stop = shutdown.triggered();
        tokio::pin!(stop);
        loop {
            tokio::select! {
                biased;
                _ = &mut stop => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        debug!("event channel closed");
                        break;
                    }
                },
            }
        }
        info!("event drive loop stopped");
    }
}
