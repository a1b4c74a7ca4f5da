//! Metrics definitions for the broadcast client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `bc_` prefix for broadcast client
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `outcome`: `success`, `cancelled` or an [`ErrorKind`](crate::errors::ErrorKind) label
//! - `role`: 2 values
//! - `source`: `cache`, `backend`, `error`
//! - `media_kind`: 2 values
//!
//! The embedding application installs the recorder; without one these calls
//! are no-ops.

use common::types::{MediaKind, Role};
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the outcome of a join attempt.
///
/// Metrics: `bc_join_total`, `bc_join_duration_seconds`
/// Labels: `role`, `outcome`
pub fn record_join(role: Role, outcome: &'static str, duration: Duration) {
    counter!("bc_join_total", "role" => role.as_str(), "outcome" => outcome).increment(1);
    histogram!("bc_join_duration_seconds", "role" => role.as_str(), "outcome" => outcome)
        .record(duration.as_secs_f64());
}

/// Record a completed leave.
///
/// Metric: `bc_leave_total`
pub fn record_leave() {
    counter!("bc_leave_total").increment(1);
}

/// Record where a credential came from.
///
/// Metric: `bc_credential_fetch_total`
/// Labels: `source` (cache, backend, error)
pub fn record_credential_fetch(source: &'static str) {
    counter!("bc_credential_fetch_total", "source" => source).increment(1);
}

/// Set the number of subscribed remote participants.
///
/// Metric: `bc_remote_participants_active`
pub fn set_remote_participants_active(count: usize) {
    // usize to f64 conversion is safe for realistic participant counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("bc_remote_participants_active").set(count as f64);
}

/// Record a failed subscription to a remote participant.
///
/// Metric: `bc_subscribe_failures_total`
/// Labels: `media_kind`
pub fn record_subscribe_failure(kind: MediaKind) {
    counter!("bc_subscribe_failures_total", "media_kind" => kind.as_str()).increment(1);
}
