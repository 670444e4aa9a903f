//! Prometheus metrics helpers for Tideline.
//!
//! This module provides metrics initialization and the metric descriptions
//! used by the ingest components.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tideline_core::metrics::init_metrics;
//!
//! fn main() {
//!     // Install the recorder and serve /metrics on port 9091
//!     init_metrics(9091).unwrap();
//!
//!     // Now use metrics anywhere in your code
//!     metrics::counter!("ingest_events_submitted_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`ingest_`, `source_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: only low-cardinality ones (`outcome`), never entity names

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Install the Prometheus recorder and serve `/metrics` on `port`.
///
/// The exporter runs its own listener in the background. Fails if a recorder
/// is already installed or the port can't be bound.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    register_metrics();
    tracing::info!("Metrics server listening on http://{}/metrics", addr);
    Ok(())
}

/// Try to install a recorder without a listener.
///
/// Returns `None` if a recorder is already installed. Useful for tests.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_metrics();
    Some(handle)
}

/// Register descriptions for every metric Tideline records.
fn register_metrics() {
    // =========================================================================
    // Emission Pipeline
    // =========================================================================

    describe_counter!(
        "ingest_records_total",
        "Log records offered to the emission pipeline"
    );
    describe_counter!(
        "ingest_records_filtered_total",
        "Log records rejected by the record filter"
    );
    describe_counter!(
        "ingest_events_submitted_total",
        "Events accepted by the ingest client"
    );
    describe_counter!(
        "ingest_events_failed_total",
        "Events that failed to encode or submit"
    );
    describe_histogram!(
        "ingest_submit_duration_seconds",
        "Time spent holding the session lock for one event"
    );

    // =========================================================================
    // Timelines
    // =========================================================================

    describe_counter!(
        "ingest_timeline_switches_total",
        "Timeline switches that reached the client (label: outcome)"
    );
    describe_gauge!("ingest_timelines", "Timelines created in this session");
    describe_gauge!(
        "ingest_attr_keys",
        "Attribute keys declared in this session"
    );

    // =========================================================================
    // Backend / Sources
    // =========================================================================

    describe_gauge!(
        "ingest_backend_enabled",
        "Whether the telemetry backend is live (1=yes, 0=disabled)"
    );
    describe_counter!(
        "source_lines_total",
        "Input lines read by record sources"
    );
    describe_counter!(
        "source_lines_invalid_total",
        "Input lines that failed to parse as log records"
    );
}

// =============================================================================
// Metric Recording Helpers
// =============================================================================

/// Increment a counter.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Increment a counter carrying an `outcome` label.
#[inline]
pub fn increment_outcome(name: &'static str, outcome: &'static str) {
    metrics::counter!(name, "outcome" => outcome).increment(1);
}

/// Set a gauge value.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}

/// Record a duration in seconds.
#[inline]
pub fn record_duration(name: &'static str, elapsed: std::time::Duration) {
    metrics::histogram!(name).record(elapsed.as_secs_f64());
}
