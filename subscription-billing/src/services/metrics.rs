//! Metrics module for subscription-billing.
//! Prometheus counters for billing runs, per-subscription outcomes and
//! outbound vendor calls.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{
    histogram_opts, opts, register_counter_vec, register_histogram_vec,
    register_int_counter_vec, CounterVec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::OnceLock;
use std::time::Duration;

/// Recorder behind the `metrics` facade used by the HTTP middleware.
pub static METRICS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Billing and reconciliation runs by kind and status
pub static BILLING_RUNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Per-subscription results by outcome and final state
pub static SUBSCRIPTION_OUTCOMES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Captured amount by subscription type
pub static CHARGE_AMOUNT_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Outbound vendor call latency
pub static EXTERNAL_CALL_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    METRICS_HANDLE.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    });

    BILLING_RUNS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_billing_runs_total",
                "Total billing runs by kind and status"
            ),
            &["kind", "status"]
        )
        .expect("Failed to register BILLING_RUNS_TOTAL")
    });

    SUBSCRIPTION_OUTCOMES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "subscription_billing_subscription_outcomes_total",
                "Per-subscription results by outcome and state"
            ),
            &["outcome", "state"]
        )
        .expect("Failed to register SUBSCRIPTION_OUTCOMES_TOTAL")
    });

    CHARGE_AMOUNT_TOTAL.get_or_init(|| {
        register_counter_vec!(
            opts!(
                "subscription_billing_charge_amount_total",
                "Total captured amount by subscription type"
            ),
            &["subscription_type"]
        )
        .expect("Failed to register CHARGE_AMOUNT_TOTAL")
    });

    // Vendor APIs are slow; buckets reach well past the default 10s.
    EXTERNAL_CALL_DURATION.get_or_init(|| {
        register_histogram_vec!(
            histogram_opts!(
                "subscription_billing_external_call_duration_seconds",
                "Outbound vendor API call duration",
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
            ),
            &["vendor", "operation"]
        )
        .expect("Failed to register EXTERNAL_CALL_DURATION")
    });
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    let mut body = String::from_utf8(buffer).unwrap_or_default();

    if let Some(Some(handle)) = METRICS_HANDLE.get() {
        body.push_str(&handle.render());
    }
    body
}

/// Record a completed (or failed) run.
pub fn record_billing_run(kind: &str, status: &str) {
    if let Some(counter) = BILLING_RUNS_TOTAL.get() {
        counter.with_label_values(&[kind, status]).inc();
    }
}

/// Record one subscription's result within a run.
pub fn record_subscription_outcome(outcome: &str, state: &str) {
    if let Some(counter) = SUBSCRIPTION_OUTCOMES_TOTAL.get() {
        counter.with_label_values(&[outcome, state]).inc();
    }
}

/// Record a captured charge amount.
pub fn record_charge_amount(subscription_type: &str, amount: Decimal) {
    if let Some(counter) = CHARGE_AMOUNT_TOTAL.get() {
        counter
            .with_label_values(&[subscription_type])
            .inc_by(amount.abs().to_f64().unwrap_or_default());
    }
}

/// Record an outbound vendor call duration.
pub fn observe_external_call(vendor: &str, operation: &str, elapsed: Duration) {
    if let Some(histogram) = EXTERNAL_CALL_DURATION.get() {
        histogram
            .with_label_values(&[vendor, operation])
            .observe(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_runs_are_rendered() {
        init_metrics();
        init_metrics();
        record_billing_run("cycle", "completed");
        record_subscription_outcome("charged", "rescheduled");

        let body = get_metrics();
        assert!(body.contains("subscription_billing_runs_total"));
        assert!(body.contains("subscription_billing_subscription_outcomes_total"));
    }
}
