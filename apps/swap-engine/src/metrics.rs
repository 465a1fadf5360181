//! Prometheus metrics.
//!
//! Counters, gauges, and histograms for the order pipeline, exposed at
//! `/metrics` on the HTTP server.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::models::{OrderStatus, Venue};
use crate::queue::QueueMetrics;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// The Prometheus handle, if metrics were initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!(
        "swap_engine_orders_submitted_total",
        "Orders accepted by the submission endpoint"
    );
    describe_counter!(
        "swap_engine_orders_terminal_total",
        "Orders reaching a terminal status, by status"
    );
    describe_counter!(
        "swap_engine_stream_messages_sent_total",
        "Status updates delivered to subscribers"
    );
    describe_counter!(
        "swap_engine_stream_messages_dropped_total",
        "Status updates dropped due to slow subscribers"
    );

    describe_gauge!("swap_engine_queue_waiting", "Jobs waiting for a worker");
    describe_gauge!("swap_engine_queue_active", "Jobs owned by workers");
    describe_gauge!("swap_engine_queue_delayed", "Jobs parked for backoff");

    describe_histogram!(
        "swap_engine_quote_latency_seconds",
        "Venue quote round-trip time"
    );
    describe_histogram!(
        "swap_engine_swap_latency_seconds",
        "Venue swap round-trip time"
    );
}

/// Record an accepted submission.
pub fn record_order_submitted() {
    counter!("swap_engine_orders_submitted_total").increment(1);
}

/// Record an order reaching a terminal status.
pub fn record_order_terminal(status: OrderStatus) {
    counter!(
        "swap_engine_orders_terminal_total",
        "status" => status.as_str()
    )
    .increment(1);
}

/// Record status updates delivered to subscribers.
pub fn record_stream_messages_sent(count: u64) {
    if count > 0 {
        counter!("swap_engine_stream_messages_sent_total").increment(count);
    }
}

/// Record one dropped status update.
pub fn record_stream_message_dropped() {
    counter!("swap_engine_stream_messages_dropped_total").increment(1);
}

/// Publish the queue counters as gauges.
pub fn record_queue_depth(metrics: &QueueMetrics) {
    #[allow(clippy::cast_precision_loss)]
    {
        gauge!("swap_engine_queue_waiting").set(metrics.waiting as f64);
        gauge!("swap_engine_queue_active").set(metrics.active as f64);
        gauge!("swap_engine_queue_delayed").set(metrics.delayed as f64);
    }
}

/// Record a venue quote round-trip.
pub fn record_quote_latency(venue: Venue, duration: Duration) {
    histogram!(
        "swap_engine_quote_latency_seconds",
        "venue" => venue.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record a venue swap round-trip.
pub fn record_swap_latency(venue: Venue, duration: Duration) {
    histogram!(
        "swap_engine_swap_latency_seconds",
        "venue" => venue.as_str()
    )
    .record(duration.as_secs_f64());
}
