//! Prometheus metrics for the delivery service.
//!
//! - Attempt metrics (transport calls by kind and result)
//! - Outcome metrics (terminal results by kind and outcome, end-to-end latency)
//! - Queue metrics (depth, in-flight jobs, rejections, expired records)

mod helpers;

pub use helpers::{encode_metrics, DeliveryMetrics, QueueMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "notify";

lazy_static! {
    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Transport calls by notification kind and attempt result
    pub static ref DELIVERY_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_attempts_total", METRIC_PREFIX),
        "Total transport delivery attempts",
        &["kind", "result"]
    ).unwrap();

    /// Terminal outcomes by notification kind
    pub static ref DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Total requests reaching a terminal outcome",
        &["kind", "outcome"]
    ).unwrap();

    /// Time from submission to terminal outcome, including backoff
    pub static ref DELIVERY_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        format!("{}_delivery_duration_seconds", METRIC_PREFIX),
        "End-to-end delivery duration in seconds",
        &["outcome"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).unwrap();

    // ============================================================================
    // Queue Metrics
    // ============================================================================

    /// Jobs waiting for a worker
    pub static ref QUEUE_DEPTH: IntGauge = register_int_gauge!(
        format!("{}_queue_depth", METRIC_PREFIX),
        "Number of jobs buffered in the delivery queue"
    ).unwrap();

    /// Jobs currently being delivered
    pub static ref JOBS_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_jobs_in_flight", METRIC_PREFIX),
        "Number of deliveries currently running"
    ).unwrap();

    /// Enqueue rejections by reason
    pub static ref JOBS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_jobs_rejected_total", METRIC_PREFIX),
        "Total jobs rejected at enqueue",
        &["reason"]
    ).unwrap();

    /// Finished job records removed after their retention period
    pub static ref JOBS_EXPIRED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_jobs_expired_total", METRIC_PREFIX),
        "Total finished job records expired"
    ).unwrap();
}
