//! Prometheus metrics for admin-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "admin_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for background recalculation outcomes.
pub static INTEGRITY_RECALCULATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "admin_integrity_recalculations_total",
        "Total number of integrity recalculation sweeps",
        &["status"]
    )
    .expect("Failed to register INTEGRITY_RECALCULATIONS")
});

/// Counter for integrity violations found during verification.
pub static INTEGRITY_VIOLATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "admin_integrity_violations_total",
        "Total number of integrity violations reported",
        &["kind"]
    )
    .expect("Failed to register INTEGRITY_VIOLATIONS")
});

/// Counter for rejected permission mutations.
pub static PERMISSION_REJECTIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "admin_permission_rejections_total",
        "Total number of permission mutations rejected before persistence",
        &["reason"]
    )
    .expect("Failed to register PERMISSION_REJECTIONS")
});

/// Counter for login attempts.
pub static LOGINS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "admin_logins_total",
        "Total number of login attempts",
        &["status"]
    )
    .expect("Failed to register LOGINS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&INTEGRITY_RECALCULATIONS);
    Lazy::force(&INTEGRITY_VIOLATIONS);
    Lazy::force(&PERMISSION_REJECTIONS);
    Lazy::force(&LOGINS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_recalculation(status: &str) {
    INTEGRITY_RECALCULATIONS.with_label_values(&[status]).inc();
}

pub fn record_violation(kind: &str) {
    INTEGRITY_VIOLATIONS.with_label_values(&[kind]).inc();
}

pub fn record_permission_rejection(reason: &str) {
    PERMISSION_REJECTIONS.with_label_values(&[reason]).inc();
}

pub fn record_login(status: &str) {
    LOGINS.with_label_values(&[status]).inc();
}
