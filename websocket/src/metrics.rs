//! Prometheus metrics for subscriber fan-out.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Opts, Registry,
};

/// Counters and gauges owned by the [`BroadcastHub`](crate::BroadcastHub).
#[derive(Clone)]
pub struct HubMetrics {
    /// Messages fanned out to the subscriber set.
    pub broadcasts: IntCounter,
    /// Individual subscriber sends that failed.
    pub send_failures: IntCounter,
    /// Currently registered subscribers.
    pub subscribers: IntGauge,
}

impl HubMetrics {
    /// Register the hub metrics in `registry`.
    pub fn new(registry: &Registry) -> Self {
        let broadcasts = register_int_counter_with_registry!(
            Opts::new("cmon_broadcasts_total", "Messages broadcast to subscribers"),
            registry
        )
        .expect("failed to register broadcasts counter");

        let send_failures = register_int_counter_with_registry!(
            Opts::new(
                "cmon_subscriber_send_failures_total",
                "Subscriber sends that failed"
            ),
            registry
        )
        .expect("failed to register send_failures counter");

        let subscribers = register_int_gauge_with_registry!(
            Opts::new("cmon_subscribers", "Connected subscribers"),
            registry
        )
        .expect("failed to register subscribers gauge");

        Self {
            broadcasts,
            send_failures,
            subscribers,
        }
    }
}
