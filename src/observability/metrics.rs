//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bootstrap_requests_total` (counter): requests by status code
//! - `bootstrap_request_duration_seconds` (histogram): latency distribution
//! - `bootstrap_rejections_total` (counter): requests stopped before the handler, by reason
//! - `lifecycle_callback_failures_total` (counter): failed callbacks by event
//! - `preemptive_replays_total` (counter): replay outcomes
//!
//! Recording goes through the `metrics` facade and is a no-op until
//! [`init_metrics`] installs the Prometheus exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`. Needs a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_request(status: u16, start: Instant) {
    metrics::counter!("bootstrap_requests_total", "status" => status.to_string()).increment(1);
    metrics::histogram!("bootstrap_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    metrics::counter!("bootstrap_rejections_total", "reason" => reason).increment(1);
}

pub fn record_callback_failure(event: &'static str) {
    metrics::counter!("lifecycle_callback_failures_total", "event" => event).increment(1);
}

pub fn record_replay(outcome: &'static str) {
    metrics::counter!("preemptive_replays_total", "outcome" => outcome).increment(1);
}
