//! Process-wide counters exposed through the `/metrics` endpoint (§4.13).
//! Plain atomics rather than a metrics-crate registry: the counter set is
//! small and fixed, and every reader just wants a point-in-time snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct Metrics {
    kills_received_total: AtomicU64,
    kills_enriched_total: AtomicU64,
    kills_skipped_older_total: AtomicU64,
    parse_errors_total: AtomicU64,
    enrichment_timeouts_total: AtomicU64,
    broker_lagged_total: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub kills_received_total: u64,
    pub kills_enriched_total: u64,
    pub kills_skipped_older_total: u64,
    pub parse_errors_total: u64,
    pub enrichment_timeouts_total: u64,
    pub broker_lagged_total: u64,
    pub active_subscriptions: u64,
    pub active_ws_sessions: u64,
    pub events_in_store: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_kill_received(&self) {
        self.kills_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_kill_enriched(&self) {
        self.kills_enriched_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_kill_skipped_older(&self) {
        self.kills_skipped_older_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enrichment_timeout(&self) {
        self.enrichment_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broker_lagged(&self, n: u64) {
        self.broker_lagged_total.fetch_add(n, Ordering::Relaxed);
    }

    /// `active_subscriptions`/`active_ws_sessions`/`events_in_store` are
    /// owned by their respective components (`SubscriptionRegistry`,
    /// the websocket session manager, `EventStore`); the caller reads those
    /// directly and folds them into the snapshot at scrape time.
    pub fn snapshot(&self, active_subscriptions: u64, active_ws_sessions: u64, events_in_store: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            kills_received_total: self.kills_received_total.load(Ordering::Relaxed),
            kills_enriched_total: self.kills_enriched_total.load(Ordering::Relaxed),
            kills_skipped_older_total: self.kills_skipped_older_total.load(Ordering::Relaxed),
            parse_errors_total: self.parse_errors_total.load(Ordering::Relaxed),
            enrichment_timeouts_total: self.enrichment_timeouts_total.load(Ordering::Relaxed),
            broker_lagged_total: self.broker_lagged_total.load(Ordering::Relaxed),
            active_subscriptions,
            active_ws_sessions,
            events_in_store,
        }
    }
}
