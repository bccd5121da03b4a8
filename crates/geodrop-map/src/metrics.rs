//! Marker pipeline metrics
//!
//! Counts are kept locally for inspection and mirrored to the `metrics`
//! facade for whatever recorder the host installs.

use metrics::{counter, describe_counter};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the lifecycle manager and pin controller
#[derive(Debug)]
pub struct MarkerMetrics {
    refreshes_applied: AtomicU64,
    refreshes_skipped: AtomicU64,
    markers_created: AtomicU64,
    markers_updated: AtomicU64,
    markers_removed: AtomicU64,
    violations: AtomicU64,
    watchdog_corrections: AtomicU64,
    surface_retries: AtomicU64,
}

impl MarkerMetrics {
    pub fn new() -> Self {
        describe_counter!("marker_refreshes_applied_total", "Bulk refresh passes applied");
        describe_counter!(
            "marker_refreshes_skipped_total",
            "Bulk refresh requests skipped or deferred"
        );
        describe_counter!("marker_created_total", "Markers created");
        describe_counter!("marker_updated_total", "Markers updated in place");
        describe_counter!("marker_removed_total", "Markers removed");
        describe_counter!(
            "marker_concurrency_violations_total",
            "Discarded mutations of protected markers"
        );
        describe_counter!(
            "pin_watchdog_corrections_total",
            "Draft pin positions re-asserted after drift"
        );
        describe_counter!("surface_retries_total", "Surface readiness retries scheduled");

        Self {
            refreshes_applied: AtomicU64::new(0),
            refreshes_skipped: AtomicU64::new(0),
            markers_created: AtomicU64::new(0),
            markers_updated: AtomicU64::new(0),
            markers_removed: AtomicU64::new(0),
            violations: AtomicU64::new(0),
            watchdog_corrections: AtomicU64::new(0),
            surface_retries: AtomicU64::new(0),
        }
    }

    pub fn record_refresh_applied(&self) {
        self.refreshes_applied.fetch_add(1, Ordering::Relaxed);
        counter!("marker_refreshes_applied_total").increment(1);
    }

    pub fn record_refresh_skipped(&self, reason: &'static str) {
        self.refreshes_skipped.fetch_add(1, Ordering::Relaxed);
        counter!("marker_refreshes_skipped_total", "reason" => reason).increment(1);
    }

    pub fn record_created(&self) {
        self.markers_created.fetch_add(1, Ordering::Relaxed);
        counter!("marker_created_total").increment(1);
    }

    pub fn record_updated(&self) {
        self.markers_updated.fetch_add(1, Ordering::Relaxed);
        counter!("marker_updated_total").increment(1);
    }

    pub fn record_removed(&self) {
        self.markers_removed.fetch_add(1, Ordering::Relaxed);
        counter!("marker_removed_total").increment(1);
    }

    pub fn record_violation(&self) {
        self.violations.fetch_add(1, Ordering::Relaxed);
        counter!("marker_concurrency_violations_total").increment(1);
    }

    pub fn record_watchdog_correction(&self) {
        self.watchdog_corrections.fetch_add(1, Ordering::Relaxed);
        counter!("pin_watchdog_corrections_total").increment(1);
    }

    pub fn record_surface_retry(&self) {
        self.surface_retries.fetch_add(1, Ordering::Relaxed);
        counter!("surface_retries_total").increment(1);
    }

    pub fn refreshes_applied(&self) -> u64 {
        self.refreshes_applied.load(Ordering::Relaxed)
    }

    pub fn refreshes_skipped(&self) -> u64 {
        self.refreshes_skipped.load(Ordering::Relaxed)
    }

    pub fn markers_created(&self) -> u64 {
        self.markers_created.load(Ordering::Relaxed)
    }

    pub fn markers_updated(&self) -> u64 {
        self.markers_updated.load(Ordering::Relaxed)
    }

    pub fn markers_removed(&self) -> u64 {
        self.markers_removed.load(Ordering::Relaxed)
    }

    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    pub fn watchdog_corrections(&self) -> u64 {
        self.watchdog_corrections.load(Ordering::Relaxed)
    }

    pub fn surface_retries(&self) -> u64 {
        self.surface_retries.load(Ordering::Relaxed)
    }
}

impl Default for MarkerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_without_recorder() {
        let metrics = MarkerMetrics::new();
        metrics.record_refresh_applied();
        metrics.record_refresh_skipped("protected");
        metrics.record_refresh_skipped("debounced");
        metrics.record_violation();

        assert_eq!(metrics.refreshes_applied(), 1);
        assert_eq!(metrics.refreshes_skipped(), 2);
        assert_eq!(metrics.violations(), 1);
        assert_eq!(metrics.watchdog_corrections(), 0);
    }
}
