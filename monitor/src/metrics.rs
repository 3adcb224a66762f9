//! Prometheus metrics for the aggregation engine.
//!
//! [`MonitorMetrics`] registers into a shared [`Registry`] so the listener's
//! `/metrics` endpoint exposes monitor and hub metrics together.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_with_registry, IntCounterVec,
    IntGauge, Opts, Registry,
};

/// Counters and gauges updated by the reader, tally parser and aggregator.
#[derive(Clone)]
pub struct MonitorMetrics {
    // ── Counters ────────────────────────────────────────────────────────
    /// Refresh cycles, labelled `outcome` = `online` | `offline`.
    pub refreshes: IntCounterVec,
    /// Failed upstream point queries, labelled by `operation`.
    pub upstream_failures: IntCounterVec,
    /// Vote entries whose identity key has no directory entry, labelled by `kind`.
    pub lookup_misses: IntCounterVec,
    /// Upstream events received, labelled by `class`.
    pub events: IntCounterVec,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Entries in the current validator directory.
    pub directory_size: IntGauge,
    /// 1 while the last snapshot was online, 0 otherwise.
    pub node_online: IntGauge,
}

impl MonitorMetrics {
    /// Register the monitor metrics in `registry`.
    pub fn new(registry: &Registry) -> Self {
        let refreshes = register_int_counter_vec_with_registry!(
            Opts::new("cmon_refresh_cycles_total", "Refresh cycles by outcome"),
            &["outcome"],
            registry
        )
        .expect("failed to register refreshes counter");

        let upstream_failures = register_int_counter_vec_with_registry!(
            Opts::new(
                "cmon_upstream_failures_total",
                "Failed upstream queries by operation"
            ),
            &["operation"],
            registry
        )
        .expect("failed to register upstream_failures counter");

        let lookup_misses = register_int_counter_vec_with_registry!(
            Opts::new(
                "cmon_directory_lookup_misses_total",
                "Vote entries with no matching directory entry"
            ),
            &["kind"],
            registry
        )
        .expect("failed to register lookup_misses counter");

        let events = register_int_counter_vec_with_registry!(
            Opts::new("cmon_upstream_events_total", "Upstream events by class"),
            &["class"],
            registry
        )
        .expect("failed to register events counter");

        let directory_size = register_int_gauge_with_registry!(
            Opts::new("cmon_directory_size", "Validators in the directory"),
            registry
        )
        .expect("failed to register directory_size gauge");

        let node_online = register_int_gauge_with_registry!(
            Opts::new("cmon_node_online", "Whether the monitored node is online"),
            registry
        )
        .expect("failed to register node_online gauge");

        Self {
            refreshes,
            upstream_failures,
            lookup_misses,
            events,
            directory_size,
            node_online,
        }
    }

    /// Metrics registered into a throwaway registry.
    pub fn unregistered() -> Self {
        Self::new(&Registry::new())
    }
}
