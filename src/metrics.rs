//! Synchronization metrics
//!
//! Each [`crate::engine::SyntaxEngine`] owns one [`SyncMetrics`]. Counters are
//! lock-free atomics bumped on the hot paths (edits, timer resets, parses);
//! per-operation timings live in a `DashMap` keyed by operation name.
//!
//! ## Metrics Tracked
//!
//! - Full and incremental parses, failures and timeouts
//! - Edits applied to a tree and edits dropped because no tree existed
//! - Debounce timer resets and timer fires
//! - Committed tree updates and verification runs
//! - Latencies of parses and of the engine query calls (`containing_node`,
//!   `bracketing_children`, `swap_siblings`)

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct SyncMetrics {
    full_parses: AtomicU64,
    incremental_parses: AtomicU64,
    parse_failures: AtomicU64,
    parse_timeouts: AtomicU64,

    edits_applied: AtomicU64,
    edits_dropped: AtomicU64,

    debounce_resets: AtomicU64,
    scheduled_fires: AtomicU64,

    tree_updates: AtomicU64,
    verifications: AtomicU64,

    // Operation name -> durations in microseconds
    operation_timings: DashMap<&'static str, Vec<u64>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful parse. `incremental` is true when an edited
    /// previous tree was handed to the parser.
    pub fn record_parse(&self, incremental: bool) {
        if incremental {
            self.incremental_parses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.full_parses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_parse_failure(&self, timed_out: bool) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.parse_timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_edits_applied(&self, count: usize) {
        self.edits_applied.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_edits_dropped(&self, count: usize) {
        self.edits_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records a pending debounce timer being cancelled and replaced.
    pub fn record_debounce_reset(&self) {
        self.debounce_resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scheduled_fire(&self) {
        self.scheduled_fires.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tree_update(&self) {
        self.tree_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verification(&self) {
        self.verifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Total successful parses, full and incremental.
    pub fn parses(&self) -> u64 {
        self.full_parses.load(Ordering::Relaxed) + self.incremental_parses.load(Ordering::Relaxed)
    }

    /// Records the timing of an operation
    ///
    /// # Arguments
    /// * `operation` - Name of the operation (e.g., "parse", "containing_node")
    /// * `duration` - Duration of the operation
    pub fn record_timing(&self, operation: &'static str, duration: Duration) {
        let micros = duration.as_micros() as u64;
        self.operation_timings.entry(operation).or_default().push(micros);
    }

    /// Starts a timer that records into `operation` when dropped.
    pub fn time(&self, operation: &'static str) -> TimingGuard<'_> {
        TimingGuard { metrics: self, operation, start: Instant::now() }
    }

    /// Gets summary statistics for an operation
    pub fn operation_stats(&self, operation: &str) -> Option<OperationStats> {
        let timings = self.operation_timings.get(operation)?;
        let mut sorted = timings.value().clone();
        drop(timings);
        sorted.sort_unstable();

        let count = sorted.len();
        if count == 0 {
            return Some(OperationStats::default());
        }

        let sum: u64 = sorted.iter().sum();
        let p95_idx = (count as f64 * 0.95) as usize;
        let p99_idx = (count as f64 * 0.99) as usize;

        Some(OperationStats {
            count,
            min_micros: sorted[0],
            max_micros: sorted[count - 1],
            mean_micros: sum / count as u64,
            p50_micros: sorted[count / 2],
            p95_micros: sorted[p95_idx.min(count - 1)],
            p99_micros: sorted[p99_idx.min(count - 1)],
        })
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            full_parses: self.full_parses.load(Ordering::Relaxed),
            incremental_parses: self.incremental_parses.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            parse_timeouts: self.parse_timeouts.load(Ordering::Relaxed),
            edits_applied: self.edits_applied.load(Ordering::Relaxed),
            edits_dropped: self.edits_dropped.load(Ordering::Relaxed),
            debounce_resets: self.debounce_resets.load(Ordering::Relaxed),
            scheduled_fires: self.scheduled_fires.load(Ordering::Relaxed),
            tree_updates: self.tree_updates.load(Ordering::Relaxed),
            verifications: self.verifications.load(Ordering::Relaxed),
        }
    }

    /// Resets all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.full_parses,
            &self.incremental_parses,
            &self.parse_failures,
            &self.parse_timeouts,
            &self.edits_applied,
            &self.edits_dropped,
            &self.debounce_resets,
            &self.scheduled_fires,
            &self.tree_updates,
            &self.verifications,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.operation_timings.clear();
    }
}

/// Statistics for a single operation
#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    pub count: usize,
    pub min_micros: u64,
    pub max_micros: u64,
    pub mean_micros: u64,
    pub p50_micros: u64, // Median
    pub p95_micros: u64,
    pub p99_micros: u64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub full_parses: u64,
    pub incremental_parses: u64,
    pub parse_failures: u64,
    pub parse_timeouts: u64,
    pub edits_applied: u64,
    pub edits_dropped: u64,
    pub debounce_resets: u64,
    pub scheduled_fires: u64,
    pub tree_updates: u64,
    pub verifications: u64,
}

/// RAII guard for automatic timing measurement
///
/// Records the duration of a scope when dropped.
///
/// # Example
///
/// ```
/// use syntax_sync::metrics::SyncMetrics;
///
/// let metrics = SyncMetrics::new();
/// {
///     let _guard = metrics.time("reparse");
///     // ... do work ...
/// }
/// assert_eq!(metrics.operation_stats("reparse").unwrap().count, 1);
/// ```
pub struct TimingGuard<'a> {
    metrics: &'a SyncMetrics,
    operation: &'static str,
    start: Instant,
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_timing(self.operation, self.start.elapsed());
    }
}
