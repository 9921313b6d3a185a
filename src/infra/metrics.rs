//! Lock-free metrics collection and periodic reporting
//!
//! All counters are atomics updated with Relaxed ordering. They are
//! statistics only and must not be used for coordination.

use crate::domain::notification::FailureKind;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Fetch latency bucket boundaries (milliseconds)
/// Buckets: ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, ≤10000, >10000
pub const LATENCY_BUCKET_BOUNDS_MS: [u64; 8] = [50, 100, 250, 500, 1000, 2500, 5000, 10000];
pub const LATENCY_NUM_BUCKETS: usize = 9;

#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    LATENCY_BUCKET_BOUNDS_MS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Lock-free metrics collector for refresh cycles
#[derive(Default)]
pub struct Metrics {
    refreshes_started: AtomicU64,
    refreshes_rendered: AtomicU64,
    stale_dropped: AtomicU64,
    failures_timeout: AtomicU64,
    failures_server_error: AtomicU64,
    failures_no_response: AtomicU64,
    failures_malformed: AtomicU64,
    failures_other: AtomicU64,
    /// Monotonic fetch latency histogram
    latency_buckets: [AtomicU64; LATENCY_NUM_BUCKETS],
    latency_sum_ms: AtomicU64,
    /// Reset on report
    fetches_since_report: AtomicU64,
    latency_sum_since_report_ms: AtomicU64,
    latency_max_since_report_ms: AtomicU64,
    last_success_unix: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_refresh_started(&self) {
        self.refreshes_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the round-trip time of a completed fetch, successful or not
    pub fn record_fetch_latency(&self, latency_ms: u64) {
        self.latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.fetches_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_since_report_ms.fetch_add(latency_ms, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_since_report_ms, latency_ms);
    }

    pub fn record_rendered(&self, unix_secs: u64) {
        self.refreshes_rendered.fetch_add(1, Ordering::Relaxed);
        self.last_success_unix.store(unix_secs, Ordering::Relaxed);
    }

    pub fn record_stale_dropped(&self) {
        self.stale_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: FailureKind) {
        let counter = match kind {
            FailureKind::Timeout => &self.failures_timeout,
            FailureKind::ServerError(_) => &self.failures_server_error,
            FailureKind::NoResponse => &self.failures_no_response,
            FailureKind::MalformedResponse => &self.failures_malformed,
            FailureKind::Other => &self.failures_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn refreshes_started(&self) -> u64 {
        self.refreshes_started.load(Ordering::Relaxed)
    }

    pub fn refreshes_rendered(&self) -> u64 {
        self.refreshes_rendered.load(Ordering::Relaxed)
    }

    pub fn stale_dropped(&self) -> u64 {
        self.stale_dropped.load(Ordering::Relaxed)
    }

    pub fn failures_total(&self) -> u64 {
        self.failures_timeout.load(Ordering::Relaxed)
            + self.failures_server_error.load(Ordering::Relaxed)
            + self.failures_no_response.load(Ordering::Relaxed)
            + self.failures_malformed.load(Ordering::Relaxed)
            + self.failures_other.load(Ordering::Relaxed)
    }

    /// Failure counts labelled by kind, in a stable order
    pub fn failures_by_kind(&self) -> [(&'static str, u64); 5] {
        [
            ("timeout", self.failures_timeout.load(Ordering::Relaxed)),
            ("server_error", self.failures_server_error.load(Ordering::Relaxed)),
            ("no_response", self.failures_no_response.load(Ordering::Relaxed)),
            ("malformed_response", self.failures_malformed.load(Ordering::Relaxed)),
            ("other", self.failures_other.load(Ordering::Relaxed)),
        ]
    }

    /// Cumulative latency histogram counts and sum
    pub fn latency_histogram(&self) -> ([u64; LATENCY_NUM_BUCKETS], u64) {
        let mut buckets = [0u64; LATENCY_NUM_BUCKETS];
        for (i, bucket) in self.latency_buckets.iter().enumerate() {
            buckets[i] = bucket.load(Ordering::Relaxed);
        }
        (buckets, self.latency_sum_ms.load(Ordering::Relaxed))
    }

    pub fn last_success_unix(&self) -> u64 {
        self.last_success_unix.load(Ordering::Relaxed)
    }

    /// Snapshot totals and reset the per-report window
    pub fn report(&self) -> MetricsSummary {
        let fetches = self.fetches_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_since_report_ms.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_since_report_ms.swap(0, Ordering::Relaxed);

        MetricsSummary {
            refreshes_started: self.refreshes_started(),
            refreshes_rendered: self.refreshes_rendered(),
            failures_total: self.failures_total(),
            stale_dropped: self.stale_dropped(),
            fetches_since_report: fetches,
            avg_latency_ms: if fetches > 0 { latency_sum / fetches } else { 0 },
            max_latency_ms: latency_max,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub refreshes_started: u64,
    pub refreshes_rendered: u64,
    pub failures_total: u64,
    pub stale_dropped: u64,
    pub fetches_since_report: u64,
    pub avg_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            refreshes_started = %self.refreshes_started,
            refreshes_rendered = %self.refreshes_rendered,
            failures_total = %self.failures_total,
            stale_dropped = %self.stale_dropped,
            fetches = %self.fetches_since_report,
            avg_latency_ms = %self.avg_latency_ms,
            max_latency_ms = %self.max_latency_ms,
            "metrics"
        );
    }
}
