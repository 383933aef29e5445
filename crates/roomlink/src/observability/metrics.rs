//! Metric recording helpers.
//!
//! All metrics follow Prometheus naming conventions:
//! - `roomlink_` prefix
//! - `_total` suffix for counters
//!
//! Recording is a no-op unless the host process installs a recorder.

use metrics::{counter, gauge};

// ============================================================================
// Session Metrics
// ============================================================================

/// A session actor started.
///
/// Metric: `roomlink_sessions_active`
pub fn session_started() {
    gauge!("roomlink_sessions_active").increment(1.0);
}

/// A session actor stopped.
///
/// Metric: `roomlink_sessions_active`
pub fn session_ended() {
    gauge!("roomlink_sessions_active").decrement(1.0);
}

/// Record the result of one reconnection attempt.
///
/// Metric: `roomlink_reconnect_attempts_total`
/// Labels: `outcome` (success, retry, exhausted)
pub fn record_reconnect_attempt(outcome: &'static str) {
    counter!("roomlink_reconnect_attempts_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// Negotiation Metrics
// ============================================================================

/// Record a completed offer/answer exchange.
///
/// Metric: `roomlink_negotiations_completed_total`
/// Labels: `role`
pub fn record_negotiation_completed(role: &'static str) {
    counter!("roomlink_negotiations_completed_total", "role" => role).increment(1);
}

/// Record a failed negotiation step.
///
/// Metric: `roomlink_negotiation_failures_total`
/// Labels: `stage` (create_offer, create_answer, set_local, set_remote, add_candidate, decode)
pub fn record_negotiation_failure(stage: &'static str) {
    counter!("roomlink_negotiation_failures_total", "stage" => stage).increment(1);
}

// ============================================================================
// Store Metrics
// ============================================================================

/// Record a failed store operation.
///
/// Metric: `roomlink_store_errors_total`
/// Labels: `operation` (write, update, delete, push, read, on_disconnect, reconnect)
pub fn record_store_error(operation: &'static str) {
    counter!("roomlink_store_errors_total", "operation" => operation).increment(1);
}

/// Record a remote hangup.
///
/// Metric: `roomlink_remote_hangups_total`
pub fn record_remote_hangup() {
    counter!("roomlink_remote_hangups_total").increment(1);
}
