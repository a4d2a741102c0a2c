//! Prometheus metrics collection for capauthd.
//!
//! Exposed on the metrics HTTP endpoint:
//!
//! - `capauthd_operations_total{operation}` - Authority operations by type
//! - `capauthd_operation_duration_seconds{operation}` - Operation latency
//! - `capauthd_grant_outcomes_total{outcome}` - Grants by outcome (`granted` or error code)
//! - `capauthd_capabilities{status}` - Capabilities per status
//! - `capauthd_pending_requests` - Requests still awaiting a grant

use crate::caps::store::StatusCounts;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Operations processed by type.
pub static OPERATION_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Operation latency by type.
pub static OPERATION_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Grant attempts by outcome.
pub static GRANT_OUTCOMES: OnceLock<IntCounterVec> = OnceLock::new();

pub static CAPABILITIES: OnceLock<IntGaugeVec> = OnceLock::new();

pub static PENDING_REQUESTS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Called once at startup before the metrics endpoint is served. Until then
/// every recording helper is a no-op.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(OPERATION_COUNTER, IntCounterVec::new(Opts::new("capauthd_operations_total", "Authority operations by type"), &["operation"]));
    register!(OPERATION_LATENCY, HistogramVec::new(
        HistogramOpts::new("capauthd_operation_duration_seconds", "Authority operation latency by type")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        &["operation"]));
    register!(GRANT_OUTCOMES, IntCounterVec::new(Opts::new("capauthd_grant_outcomes_total", "Grant attempts by outcome"), &["outcome"]));
    register!(CAPABILITIES, IntGaugeVec::new(Opts::new("capauthd_capabilities", "Capabilities per status"), &["status"]));
    register!(PENDING_REQUESTS, IntGauge::new("capauthd_pending_requests", "Capability requests awaiting a grant"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record an operation with latency.
#[inline]
pub fn record_operation(operation: &str, duration_secs: f64) {
    if let Some(c) = OPERATION_COUNTER.get() {
        c.with_label_values(&[operation]).inc();
    }
    if let Some(h) = OPERATION_LATENCY.get() {
        h.with_label_values(&[operation]).observe(duration_secs);
    }
}

#[inline]
pub fn record_grant_outcome(outcome: &str) {
    if let Some(c) = GRANT_OUTCOMES.get() {
        c.with_label_values(&[outcome]).inc();
    }
}

/// Refresh the per-status capability gauges.
pub fn set_capability_counts(counts: StatusCounts) {
    if let Some(g) = CAPABILITIES.get() {
        g.with_label_values(&["delegated"]).set(counts.delegated as i64);
        g.with_label_values(&["granted"]).set(counts.granted as i64);
        g.with_label_values(&["revoked"]).set(counts.revoked as i64);
        g.with_label_values(&["superseded"]).set(counts.superseded as i64);
    }
}

#[inline]
pub fn set_pending_requests(count: usize) {
    if let Some(g) = PENDING_REQUESTS.get() {
        g.set(count as i64);
    }
}
