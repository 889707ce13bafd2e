// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for tlsa-sync.
//!
//! All metrics use the namespace prefix `tlsa_sync_` and are exposed on `/metrics`.
//!
//! # Metrics
//!
//! - **Run Metrics** - Reconciliation runs by outcome and their duration
//! - **Record Metrics** - TLSA records added, deleted and skipped
//! - **Upstream Metrics** - Failed calls to Stalwart and Cloudflare
//!
//! # Example
//!
//! ```rust,no_run
//! use tlsa_sync::metrics::record_run_completed;
//!
//! record_run_completed(std::time::Duration::from_secs(1));
//! ```

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "tlsa_sync";

/// Run outcome label values
pub const OUTCOME_COMPLETED: &str = "completed";
pub const OUTCOME_SKIPPED: &str = "skipped";
pub const OUTCOME_FAILED: &str = "failed";

/// Record action label values
pub const ACTION_ADDED: &str = "added";
pub const ACTION_DELETED: &str = "deleted";
pub const ACTION_SKIPPED: &str = "skipped";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Run Metrics
// ============================================================================

/// Total number of reconciliation runs by outcome
///
/// Labels:
/// - `outcome`: `completed`, `skipped` (guard held elsewhere) or `failed`
pub static RUNS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_runs_total"),
        "Total number of reconciliation runs by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliation runs in seconds (completed and failed runs)
pub static RUN_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_run_duration_seconds"),
        "Duration of reconciliation runs in seconds",
    )
    .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Record Metrics
// ============================================================================

/// Total number of TLSA records touched, by action
///
/// Labels:
/// - `action`: `added`, `deleted` or `skipped` (malformed authoritative content)
pub static RECORDS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_records_total"),
        "Total number of TLSA records added, deleted or skipped",
    );
    let counter = CounterVec::new(opts, &["action"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Upstream Metrics
// ============================================================================

/// Total number of failed upstream calls
///
/// Labels:
/// - `service`: `stalwart` or `cloudflare`
/// - `reason`: reason label from [`crate::http_errors`]
pub static UPSTREAM_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_upstream_errors_total"),
        "Total number of failed upstream API calls by service and reason",
    );
    let counter = CounterVec::new(opts, &["service", "reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a run that completed
pub fn record_run_completed(duration: Duration) {
    RUNS_TOTAL.with_label_values(&[OUTCOME_COMPLETED]).inc();
    RUN_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a run that failed
pub fn record_run_failed(duration: Duration) {
    RUNS_TOTAL.with_label_values(&[OUTCOME_FAILED]).inc();
    RUN_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a trigger that found another run in flight
pub fn record_run_skipped() {
    RUNS_TOTAL.with_label_values(&[OUTCOME_SKIPPED]).inc();
}

/// Record TLSA records touched by a run
///
/// # Arguments
/// * `action` - One of [`ACTION_ADDED`], [`ACTION_DELETED`], [`ACTION_SKIPPED`]
/// * `count` - Number of records
pub fn record_records(action: &str, count: usize) {
    if count > 0 {
        RECORDS_TOTAL
            .with_label_values(&[action])
            .inc_by(count as f64);
    }
}

/// Record a failed upstream call
pub fn record_upstream_error(service: &str, reason: &str) {
    UPSTREAM_ERRORS_TOTAL
        .with_label_values(&[service, reason])
        .inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
