//! Prometheus metrics (spec §10.5)
//!
//! A private `Registry` plus named counters/gauges, constructed once and
//! shared via `Arc`, in the style of `canceler::server::Metrics` rather than
//! the older global `lazy_static!` registry pattern.

use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};

pub struct Metrics {
    payments_created_total: IntCounterVec,
    payments_rejected_total: IntCounterVec,
    payments_confirmed_total: IntCounterVec,
    payments_expired_total: IntCounterVec,
    payments_errored_total: IntCounterVec,
    active_monitors: IntGaugeVec,
    evm_get_logs_chunk_retries_total: prometheus::IntCounter,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let payments_created_total = IntCounterVec::new(
            Opts::new("railclaw_payments_created_total", "Payment links created"),
            &["kind"],
        )
        .expect("constant metric name is valid");

        let payments_rejected_total = IntCounterVec::new(
            Opts::new(
                "railclaw_payments_rejected_total",
                "Payment requests rejected by policy",
            ),
            &["violation"],
        )
        .expect("constant metric name is valid");

        let payments_confirmed_total = IntCounterVec::new(
            Opts::new("railclaw_payments_confirmed_total", "Payments confirmed"),
            &["kind"],
        )
        .expect("constant metric name is valid");

        let payments_expired_total = IntCounterVec::new(
            Opts::new("railclaw_payments_expired_total", "Payments expired without a match"),
            &["kind"],
        )
        .expect("constant metric name is valid");

        let payments_errored_total = IntCounterVec::new(
            Opts::new("railclaw_payments_errored_total", "Payments ended in error"),
            &["kind"],
        )
        .expect("constant metric name is valid");

        let active_monitors = IntGaugeVec::new(
            Opts::new("railclaw_active_monitors", "Currently running monitor tasks"),
            &["kind"],
        )
        .expect("constant metric name is valid");

        let evm_get_logs_chunk_retries_total = prometheus::IntCounter::new(
            "railclaw_evm_get_logs_chunk_retries_total",
            "Times a chunked eth_getLogs scan retried a chunk after a transient error",
        )
        .expect("constant metric name is valid");

        registry
            .register(Box::new(payments_created_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(payments_rejected_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(payments_confirmed_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(payments_expired_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(payments_errored_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(active_monitors.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(evm_get_logs_chunk_retries_total.clone()))
            .expect("metric registration must not be called twice");

        Self {
            payments_created_total,
            payments_rejected_total,
            payments_confirmed_total,
            payments_expired_total,
            payments_errored_total,
            active_monitors,
            evm_get_logs_chunk_retries_total,
            registry,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_payment_created(&self, kind: &str) {
        self.payments_created_total.with_label_values(&[kind]).inc();
    }

    pub fn record_payment_rejected(&self, violation: &str) {
        self.payments_rejected_total.with_label_values(&[violation]).inc();
    }

    pub fn record_payment_confirmed(&self, kind: &str) {
        self.payments_confirmed_total.with_label_values(&[kind]).inc();
    }

    pub fn record_payment_expired(&self, kind: &str) {
        self.payments_expired_total.with_label_values(&[kind]).inc();
    }

    pub fn record_payment_errored(&self, kind: &str) {
        self.payments_errored_total.with_label_values(&[kind]).inc();
    }

    /// `delta` is `+1` on monitor spawn, `-1` on monitor completion.
    pub fn set_active_monitors_delta(&self, kind: &str, delta: i64) {
        self.active_monitors.with_label_values(&[kind]).add(delta);
    }

    pub fn record_evm_chunk_retry(&self) {
        self.evm_get_logs_chunk_retries_total.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registers_without_panicking() {
        let metrics = Metrics::new();
        metrics.record_payment_created("direct");
        metrics.record_payment_rejected("chain");
        metrics.set_active_monitors_delta("bridge", 1);
        metrics.record_evm_chunk_retry();

        let families = metrics.registry().gather();
        assert!(!families.is_empty());
    }

    #[test]
    fn test_active_monitors_gauge_tracks_deltas() {
        let metrics = Metrics::new();
        metrics.set_active_monitors_delta("direct", 1);
        metrics.set_active_monitors_delta("direct", 1);
        metrics.set_active_monitors_delta("direct", -1);
        assert_eq!(metrics.active_monitors.with_label_values(&["direct"]).get(), 1);
    }
}
