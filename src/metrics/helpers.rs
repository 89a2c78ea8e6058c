//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use super::{
    DELIVERIES_TOTAL, DELIVERY_ATTEMPTS_TOTAL, DELIVERY_DURATION_SECONDS, JOBS_EXPIRED_TOTAL,
    JOBS_IN_FLIGHT, JOBS_REJECTED_TOTAL, QUEUE_DEPTH,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording delivery engine metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    /// Record one transport call (`success`, `transient` or `permanent`)
    pub fn record_attempt(kind: &str, result: &str) {
        DELIVERY_ATTEMPTS_TOTAL
            .with_label_values(&[kind, result])
            .inc();
    }

    /// Record a terminal outcome and its end-to-end duration
    pub fn record_outcome(kind: &str, outcome: &str, elapsed: Duration) {
        DELIVERIES_TOTAL.with_label_values(&[kind, outcome]).inc();
        DELIVERY_DURATION_SECONDS
            .with_label_values(&[outcome])
            .observe(elapsed.as_secs_f64());
    }
}

/// Helper struct for recording queue metrics
pub struct QueueMetrics;

impl QueueMetrics {
    pub fn job_enqueued() {
        QUEUE_DEPTH.inc();
    }

    /// A worker picked the job up
    pub fn job_started() {
        QUEUE_DEPTH.dec();
        JOBS_IN_FLIGHT.inc();
    }

    pub fn job_finished() {
        JOBS_IN_FLIGHT.dec();
    }

    /// Record an enqueue rejection (`full` or `shutting_down`)
    pub fn record_rejected(reason: &str) {
        JOBS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn record_expired(count: u64) {
        JOBS_EXPIRED_TOTAL.inc_by(count);
    }
}
