//! Metrics collection and exposition.
//!
//! # Metrics
//! - `session_preference_loads_total` (counter): bulk loads by outcome
//! - `session_preference_saves_total` (counter): persists by outcome
//! - `session_preference_fallback_writes_total` (counter): local mirror writes
//! - `session_breaker_decisions_total` (counter): admission checks by decision
//! - `session_breaker_cooldowns_total` (counter): cooldowns triggered
//! - `session_stream_connections_total` (counter): push connections opened
//! - `session_stream_events_total` (counter): push events by name
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - Prometheus exporter is opt-in via `observability.metrics_enabled`

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_preference_load(outcome: &'static str) {
    counter!("session_preference_loads_total", "outcome" => outcome).increment(1);
}

pub fn record_preference_save(outcome: &'static str) {
    counter!("session_preference_saves_total", "outcome" => outcome).increment(1);
}

pub fn record_fallback_write() {
    counter!("session_preference_fallback_writes_total").increment(1);
}

pub fn record_breaker_decision(decision: &'static str) {
    counter!("session_breaker_decisions_total", "decision" => decision).increment(1);
}

pub fn record_cooldown_triggered() {
    counter!("session_breaker_cooldowns_total").increment(1);
}

pub fn record_stream_connection() {
    counter!("session_stream_connections_total").increment(1);
}

pub fn record_stream_event(event: &'static str) {
    counter!("session_stream_events_total", "event" => event).increment(1);
}
