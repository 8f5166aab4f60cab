//! Metrics collection and exposition.
//!
//! # Metrics
//! - `analytics_bus_published_total` (counter): messages accepted, by topic
//! - `analytics_bus_publish_errors_total` (counter): rejected publishes, by topic and reason
//! - `analytics_messages_processed_total` (counter): messages that ran a full chain, by topic
//! - `analytics_handler_failures_total` (counter): handler errors and panics, by topic and handler
//! - `analytics_diffs_recorded_total` (counter): `record_diff` outcomes
//! - `analytics_diffs_pending` (gauge): unique diffs awaiting the next flush
//! - `analytics_notifications_sent_total` (counter): notification attempts, by module and outcome
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_published(topic: &str) {
    counter!("analytics_bus_published_total", "topic" => topic.to_string()).increment(1);
}

pub fn record_publish_error(topic: &str, reason: &'static str) {
    counter!(
        "analytics_bus_publish_errors_total",
        "topic" => topic.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_message_processed(topic: &str) {
    counter!("analytics_messages_processed_total", "topic" => topic.to_string()).increment(1);
}

pub fn record_handler_failure(topic: &str, handler: &str) {
    counter!(
        "analytics_handler_failures_total",
        "topic" => topic.to_string(),
        "handler" => handler.to_string()
    )
    .increment(1);
}

pub fn record_diff_outcome(outcome: &'static str) {
    counter!("analytics_diffs_recorded_total", "outcome" => outcome).increment(1);
}

pub fn set_diffs_pending(count: usize) {
    gauge!("analytics_diffs_pending").set(count as f64);
}

pub fn record_notification(module: &str, outcome: &'static str) {
    counter!(
        "analytics_notifications_sent_total",
        "module" => module.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
