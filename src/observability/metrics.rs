//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tunnel_requests_total` (counter): ingress requests by outcome
//! - `tunnel_round_trip_seconds` (histogram): OUT enqueue to IN resolution
//! - `tunnel_pending_requests` (gauge): entries in the pending registry
//! - `tunnel_envelopes_sent_total` (counter): envelopes handed to the transport
//! - `tunnel_envelopes_received_total` (counter): envelopes decoded by the router
//! - `tunnel_messages_discarded_total` (counter): inbound messages dropped, by reason
//! - `tunnel_fetches_total` (counter): egress fetches by outcome
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Prometheus exporter is optional and bound to its own address

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(outcome: &'static str, start: Instant) {
    counter!("tunnel_requests_total", "outcome" => outcome).increment(1);
    histogram!("tunnel_round_trip_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_pending(count: usize) {
    gauge!("tunnel_pending_requests").set(count as f64);
}

pub fn record_envelope_sent(direction: &'static str) {
    counter!("tunnel_envelopes_sent_total", "direction" => direction).increment(1);
}

pub fn record_envelope_received(direction: &'static str) {
    counter!("tunnel_envelopes_received_total", "direction" => direction).increment(1);
}

pub fn record_discarded(reason: &'static str) {
    counter!("tunnel_messages_discarded_total", "reason" => reason).increment(1);
}

pub fn record_fetch(outcome: &'static str) {
    counter!("tunnel_fetches_total", "outcome" => outcome).increment(1);
}
