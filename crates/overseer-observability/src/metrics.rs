//! Runtime metrics
//!
//! Every series is registered in a registry owned by the [`RuntimeMetrics`]
//! instance. Label values are drawn from small closed sets (quota kinds,
//! outcomes, rejection codes) so cardinality stays bounded.

use crate::LATENCY_BUCKETS;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;
use thiserror::Error;

/// Counters, gauges and histograms for one runtime.
#[derive(Debug)]
pub struct RuntimeMetrics {
    registry: Registry,
    pub registrations_total: IntCounter,
    pub quota_rejections_total: IntCounterVec, // cardinality: 3 (kind)
    pub invocations_total: IntCounterVec,      // cardinality: 3 (outcome)
    pub invocation_rejections_total: IntCounterVec, // cardinality: ≤6 (reason)
    pub invocation_duration_seconds: Histogram,
    pub invocations_running: IntGauge,
    pub expired_total: IntCounter,
    pub scheduler_ticks_total: IntCounter,
    pub events_dispatched_total: IntCounter,
    pub cron_dispatched_total: IntCounter,
}

impl RuntimeMetrics {
    /// Create and register every series under `namespace`.
    pub fn new(namespace: &str) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let registrations_total = IntCounter::with_opts(Opts::new(
            format!("{namespace}_registrations_total"),
            "Total number of accepted agent registrations",
        ))?;
        let quota_rejections_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_quota_rejections_total"),
                "Registrations rejected by a quota, by kind (owner, children, spawn_rate)",
            ),
            &["kind"],
        )?;
        let invocations_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_invocations_total"),
                "Completed invocations by outcome (success, failure, timeout)",
            ),
            &["outcome"],
        )?;
        let invocation_rejections_total = IntCounterVec::new(
            Opts::new(
                format!("{namespace}_invocation_rejections_total"),
                "Invocations refused before the agent ran, by reason",
            ),
            &["reason"],
        )?;
        let invocation_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                format!("{namespace}_invocation_duration_seconds"),
                "Invocation wall time in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let invocations_running = IntGauge::with_opts(Opts::new(
            format!("{namespace}_invocations_running"),
            "Invocations currently awaiting their agent",
        ))?;
        let expired_total = IntCounter::with_opts(Opts::new(
            format!("{namespace}_expired_total"),
            "Registrations moved to expired by the sweep",
        ))?;
        let scheduler_ticks_total = IntCounter::with_opts(Opts::new(
            format!("{namespace}_scheduler_ticks_total"),
            "Scheduler ticks executed",
        ))?;
        let events_dispatched_total = IntCounter::with_opts(Opts::new(
            format!("{namespace}_events_dispatched_total"),
            "Invocations dispatched for matching events",
        ))?;
        let cron_dispatched_total = IntCounter::with_opts(Opts::new(
            format!("{namespace}_cron_dispatched_total"),
            "Invocations dispatched for due cron triggers",
        ))?;

        registry.register(Box::new(registrations_total.clone()))?;
        registry.register(Box::new(quota_rejections_total.clone()))?;
        registry.register(Box::new(invocations_total.clone()))?;
        registry.register(Box::new(invocation_rejections_total.clone()))?;
        registry.register(Box::new(invocation_duration_seconds.clone()))?;
        registry.register(Box::new(invocations_running.clone()))?;
        registry.register(Box::new(expired_total.clone()))?;
        registry.register(Box::new(scheduler_ticks_total.clone()))?;
        registry.register(Box::new(events_dispatched_total.clone()))?;
        registry.register(Box::new(cron_dispatched_total.clone()))?;

        Ok(Self {
            registry,
            registrations_total,
            quota_rejections_total,
            invocations_total,
            invocation_rejections_total,
            invocation_duration_seconds,
            invocations_running,
            expired_total,
            scheduler_ticks_total,
            events_dispatched_total,
            cron_dispatched_total,
        })
    }

    /// Get Prometheus registry for metrics export
    pub fn prometheus_registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_registration(&self) {
        self.registrations_total.inc();
    }

    pub fn record_quota_rejection(&self, kind: &str) {
        self.quota_rejections_total.with_label_values(&[kind]).inc();
    }

    pub fn record_invocation(&self, outcome: &str, duration: Duration) {
        self.invocations_total.with_label_values(&[outcome]).inc();
        self.invocation_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn record_invocation_rejection(&self, reason: &str) {
        self.invocation_rejections_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn invocation_started(&self) {
        self.invocations_running.inc();
    }

    pub fn invocation_finished(&self) {
        self.invocations_running.dec();
    }

    pub fn record_expired(&self, count: usize) {
        self.expired_total.inc_by(count as u64);
    }

    pub fn record_tick(&self, event_dispatches: usize, cron_dispatches: usize) {
        self.scheduler_ticks_total.inc();
        self.events_dispatched_total.inc_by(event_dispatches as u64);
        self.cron_dispatched_total.inc_by(cron_dispatches as u64);
    }

    /// Render every series in the Prometheus text exposition format.
    pub fn gather_text(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

/// Metrics system errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Metrics encoding error: {0}")]
    Encoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> RuntimeMetrics {
        // Use simple alphanumeric namespace for tests
        let id = uuid::Uuid::new_v4().simple().to_string();
        RuntimeMetrics::new(&format!("test{}", &id[0..8])).unwrap()
    }

    #[test]
    fn test_counters_move() {
        let metrics = metrics();
        metrics.record_registration();
        metrics.record_quota_rejection("owner");
        metrics.record_quota_rejection("owner");
        metrics.record_invocation("success", Duration::from_millis(20));
        metrics.record_expired(3);

        assert_eq!(metrics.registrations_total.get(), 1);
        assert_eq!(
            metrics
                .quota_rejections_total
                .with_label_values(&["owner"])
                .get(),
            2
        );
        assert_eq!(metrics.invocation_duration_seconds.get_sample_count(), 1);
        assert_eq!(metrics.expired_total.get(), 3);
    }

    #[test]
    fn test_running_gauge() {
        let metrics = metrics();
        metrics.invocation_started();
        metrics.invocation_started();
        metrics.invocation_finished();
        assert_eq!(metrics.invocations_running.get(), 1);
    }

    #[test]
    fn test_gather_text() {
        let metrics = metrics();
        metrics.record_tick(2, 1);
        let text = metrics.gather_text().unwrap();
        assert!(text.contains("_scheduler_ticks_total 1"));
        assert!(text.contains("_events_dispatched_total 2"));
    }

    #[test]
    fn test_two_instances_coexist() {
        let a = RuntimeMetrics::new("same").unwrap();
        let b = RuntimeMetrics::new("same").unwrap();
        a.record_registration();
        assert_eq!(b.registrations_total.get(), 0);
    }
}
