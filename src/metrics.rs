//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Record stores and loads (hit / miss / corrupt)
//! - Removals and evictions by scope
//! - Self-healing of corrupt local replicas
//! - Owner directory walks
//! - Listener registrations and forwarded events
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `session_replication_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use session_replication::metrics;
//! use std::time::Duration;
//!
//! metrics::record_store("session", true, 4, Duration::from_millis(2));
//! metrics::record_load("session", "hit");
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a store, its outcome, and how many fields were written.
pub fn record_store(kind: &str, success: bool, field_count: usize, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!("session_replication_stores_total", "kind" => kind.to_string(), "status" => status).increment(1);
    if success {
        histogram!("session_replication_store_fields", "kind" => kind.to_string()).record(field_count as f64);
    }
    histogram!("session_replication_store_duration_seconds", "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}

/// Record metadata writes skipped because the metadata was clean.
pub fn record_metadata_skipped(kind: &str) {
    counter!("session_replication_metadata_skipped_total", "kind" => kind.to_string()).increment(1);
}

/// Record a load outcome: `hit`, `miss`, `corrupt` or `error`.
pub fn record_load(kind: &str, outcome: &str) {
    counter!(
        "session_replication_loads_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a backup read (load from a named owner).
pub fn record_backup_read(kind: &str, found: bool) {
    let outcome = if found { "hit" } else { "miss" };
    counter!("session_replication_backup_reads_total", "kind" => kind.to_string(), "outcome" => outcome).increment(1);
}

/// Record a removal. `scope` is `cluster` or `local`.
pub fn record_remove(kind: &str, scope: &str) {
    counter!(
        "session_replication_removals_total",
        "kind" => kind.to_string(),
        "scope" => scope.to_string()
    )
    .increment(1);
}

/// Record an eviction.
pub fn record_evict(kind: &str) {
    counter!("session_replication_evictions_total", "kind" => kind.to_string()).increment(1);
}

/// Record a corrupt replica dropped by self-healing.
pub fn record_self_heal(kind: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("session_replication_self_heals_total", "kind" => kind.to_string(), "status" => status).increment(1);
}

/// Record an owner directory walk.
pub fn record_directory_walk(kind: &str, entries: usize, skipped: usize, duration: Duration) {
    counter!("session_replication_directory_walks_total", "kind" => kind.to_string()).increment(1);
    gauge!("session_replication_directory_entries", "kind" => kind.to_string()).set(entries as f64);
    if skipped > 0 {
        counter!("session_replication_directory_skipped_total", "kind" => kind.to_string())
            .increment(skipped as u64);
    }
    histogram!("session_replication_directory_walk_duration_seconds", "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}

/// Record the number of listeners a delegate currently holds.
pub fn set_registered_listeners(application: &str, count: usize) {
    gauge!("session_replication_registered_listeners", "application" => application.to_string())
        .set(count as f64);
}

/// Record an event forwarded to the local session manager.
pub fn record_listener_event(listener: &str, event: &str) {
    counter!(
        "session_replication_listener_events_total",
        "listener" => listener.to_string(),
        "event" => event.to_string()
    )
    .increment(1);
}

/// Record the delegate lifecycle state.
pub fn set_delegate_state(application: &str, state: &str) {
    // One series per state label; the current state reads 1
    for s in ["Created", "Running", "Stopped"] {
        let value = if s == state { 1.0 } else { 0.0 };
        gauge!(
            "session_replication_delegate_state",
            "application" => application.to_string(),
            "state" => s
        )
        .set(value);
    }
}
