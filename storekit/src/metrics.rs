use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder, HistogramVec,
    IntCounterVec, IntGaugeVec, TextEncoder,
};

lazy_static! {
    pub static ref STORE_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "store_operation_duration_seconds",
        "Data store operation duration in seconds",
        &["operation", "backend", "status"]
    ).unwrap();

    pub static ref OPERATION_COUNTER: IntCounterVec = register_int_counter_vec!(
        "store_operations_total",
        "Total number of data store operations",
        &["operation", "backend", "status"]
    ).unwrap();

    pub static ref OPEN_HANDLES: IntGaugeVec = register_int_gauge_vec!(
        "store_open_handles",
        "Number of open data store handles",
        &["backend"]
    ).unwrap();
}

pub fn record_operation(operation: &str, backend: &str, success: bool, duration: f64) {
    let status = if success { "success" } else { "failure" };
    STORE_OPERATION_DURATION
        .with_label_values(&[operation, backend, status])
        .observe(duration);
    OPERATION_COUNTER
        .with_label_values(&[operation, backend, status])
        .inc();
}

/// Render the default registry in the Prometheus text format.
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
