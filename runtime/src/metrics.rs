//! Prometheus metrics for observability and monitoring.
//!
//! The Store emits `store.*` metrics; the attendance coordinators emit
//! `checkin.*` and `rsvp.*` metrics through the recorder structs below.
//!
//! # Example
//!
//! ```rust,no_run
//! use rollcall_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//!
//! // Later: serve this text from a /metrics endpoint
//! let text = exporter.render();
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder installer and renderer.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Create an exporter that has not installed a recorder yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all metrics and install the global Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., by another test), this
    /// succeeds without a handle and `render()` returns an empty string.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Whether this exporter owns the installed recorder.
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.handle.is_some()
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle
            .as_ref()
            .map(PrometheusHandle::render)
            .unwrap_or_default()
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Store
    describe_counter!("store.commands.total", "Actions accepted by a store");
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was torn down"
    );
    describe_counter!("store.effects.executed", "Effects executed, by type");
    describe_counter!("store.effects.cancelled", "Cancel effects executed");
    describe_counter!("store.teardown.total", "Stores torn down");
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside a reducer call"
    );

    // Check-in
    describe_counter!("checkin.mint.requested", "Mint requests issued");
    describe_counter!("checkin.mint.failed", "Mint requests that produced no token");
    describe_counter!("checkin.mint.stale", "Mint results discarded as stale");
    describe_counter!("checkin.scan.outcome", "Scan cycles by terminal outcome");
    describe_counter!("checkin.scan.dropped", "Scans dropped by the lock or throttle");

    // RSVP
    describe_counter!("rsvp.mutation.started", "Optimistic mutations started");
    describe_counter!("rsvp.mutation.succeeded", "Optimistic mutations confirmed");
    describe_counter!("rsvp.mutation.refused", "Mutations refused while another was in flight");
    describe_counter!("rsvp.rollback.total", "Optimistic mutations rolled back");
    describe_counter!("rsvp.refetch.applied", "Refetch results applied to the cache");
    describe_counter!("rsvp.refetch.discarded", "Refetch results discarded");
    describe_counter!("rsvp.refetch.failed", "Refetches that left the entry stale");
    describe_histogram!(
        "rsvp.mutation.duration_seconds",
        "Time from optimistic apply to settle"
    );
}

/// Check-in metrics recorder.
pub struct CheckInMetrics;

impl CheckInMetrics {
    /// Record a mint request.
    pub fn record_mint_requested() {
        counter!("checkin.mint.requested").increment(1);
    }

    /// Record a mint that produced no token.
    pub fn record_mint_failed() {
        counter!("checkin.mint.failed").increment(1);
    }

    /// Record a mint result from a superseded generation.
    pub fn record_mint_stale() {
        counter!("checkin.mint.stale").increment(1);
    }

    /// Record the terminal outcome of a scan cycle.
    pub fn record_scan_outcome(outcome: &'static str) {
        counter!("checkin.scan.outcome", "outcome" => outcome).increment(1);
    }

    /// Record a scan dropped by a guard.
    pub fn record_scan_dropped(reason: &'static str) {
        counter!("checkin.scan.dropped", "reason" => reason).increment(1);
    }
}

/// RSVP metrics recorder.
pub struct RsvpMetrics;

impl RsvpMetrics {
    /// Record an optimistic mutation start.
    pub fn record_started(kind: &'static str) {
        counter!("rsvp.mutation.started", "kind" => kind).increment(1);
    }

    /// Record a confirmed mutation.
    pub fn record_succeeded(duration: Duration) {
        counter!("rsvp.mutation.succeeded").increment(1);
        histogram!("rsvp.mutation.duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a refused mutation.
    pub fn record_refused() {
        counter!("rsvp.mutation.refused").increment(1);
    }

    /// Record a rollback.
    pub fn record_rollback(duration: Duration) {
        counter!("rsvp.rollback.total").increment(1);
        histogram!("rsvp.mutation.duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a refetch that updated the cache.
    pub fn record_refetch_applied() {
        counter!("rsvp.refetch.applied").increment(1);
    }

    /// Record a refetch discarded because the entry moved on.
    pub fn record_refetch_discarded() {
        counter!("rsvp.refetch.discarded").increment(1);
    }

    /// Record a failed refetch.
    pub fn record_refetch_failed() {
        counter!("rsvp.refetch.failed").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_starts_uninstalled() {
        let exporter = MetricsExporter::new();
        assert!(!exporter.is_installed());
        assert_eq!(exporter.render(), "");
    }

    #[test]
    fn test_exporter_install_and_render() {
        let mut exporter = MetricsExporter::new();
        assert!(exporter.install().is_ok());

        CheckInMetrics::record_scan_outcome("accepted");
        RsvpMetrics::record_refetch_applied();

        if exporter.is_installed() {
            assert!(exporter.render().contains("checkin_scan_outcome"));
        }
    }

    #[test]
    fn test_recorders_without_installed_exporter() {
        // Must not panic with the no-op recorder
        CheckInMetrics::record_mint_requested();
        CheckInMetrics::record_mint_failed();
        CheckInMetrics::record_mint_stale();
        CheckInMetrics::record_scan_dropped("throttled");
        RsvpMetrics::record_started("add");
        RsvpMetrics::record_succeeded(Duration::from_millis(5));
        RsvpMetrics::record_refused();
        RsvpMetrics::record_rollback(Duration::from_millis(5));
        RsvpMetrics::record_refetch_discarded();
        RsvpMetrics::record_refetch_failed();
    }
}
