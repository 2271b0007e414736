//! Prometheus metrics for reconciliation-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reconciliation_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for reconciliation runs by terminal status.
pub static RECONCILIATION_RUNS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_runs_total",
        "Total number of reconciliation batch runs",
        &["status"]
    )
    .expect("Failed to register RECONCILIATION_RUNS")
});

/// Counter for reconciled invoices by match status.
pub static INVOICES_RECONCILED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_invoices_total",
        "Total number of invoices reconciled",
        &["match_status"]
    )
    .expect("Failed to register INVOICES_RECONCILED")
});

/// Counter for inference API calls by outcome.
pub static INFERENCE_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_inference_requests_total",
        "Total number of inference API requests",
        &["status"]
    )
    .expect("Failed to register INFERENCE_REQUESTS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&RECONCILIATION_RUNS);
    Lazy::force(&INVOICES_RECONCILED);
    Lazy::force(&INFERENCE_REQUESTS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a reconciliation run outcome.
pub fn record_run(status: &str) {
    RECONCILIATION_RUNS.with_label_values(&[status]).inc();
}

/// Record a reconciled invoice.
pub fn record_invoice_reconciled(match_status: &str) {
    INVOICES_RECONCILED
        .with_label_values(&[match_status])
        .inc();
}

/// Record an inference API call.
pub fn record_inference_request(status: &str) {
    INFERENCE_REQUESTS.with_label_values(&[status]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
