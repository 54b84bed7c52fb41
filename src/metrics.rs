// Workflow metrics module
//
// Provides lightweight counters for monitoring auto-config runs

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters for auto-config workflow activity
///
/// Uses atomic operations for thread-safe tracking without locks. One instance is
/// shared by every workflow built by the host and logged on shutdown.
#[derive(Debug)]
pub struct WorkflowMetrics {
    /// Runs that acquired the guard and executed the pipeline
    pub runs_started: AtomicU64,

    /// Runs dropped because another run held the guard
    pub runs_skipped_busy: AtomicU64,

    /// Runs dropped because the feature was disabled or had no URL
    pub runs_skipped_disabled: AtomicU64,

    /// Profiles added by import steps
    pub configs_imported: AtomicUsize,

    /// Profiles handed to the speed tester
    pub profiles_tested: AtomicUsize,

    /// Profiles deleted by prune steps
    pub profiles_removed: AtomicUsize,

    /// Successful promotions of a new active profile
    pub best_selected: AtomicU64,

    /// Steps that failed and were skipped
    pub step_failures: AtomicU64,

    /// Total pipeline time in milliseconds
    pub total_run_time_ms: AtomicU64,

    start_time: Instant,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_skipped_busy: AtomicU64::new(0),
            runs_skipped_disabled: AtomicU64::new(0),
            configs_imported: AtomicUsize::new(0),
            profiles_tested: AtomicUsize::new(0),
            profiles_removed: AtomicUsize::new(0),
            best_selected: AtomicU64::new(0),
            step_failures: AtomicU64::new(0),
            total_run_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_busy(&self) {
        self.runs_skipped_busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_disabled(&self) {
        self.runs_skipped_disabled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_imported(&self, count: usize) {
        self.configs_imported.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_tested(&self, count: usize) {
        self.profiles_tested.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_removed(&self, count: usize) {
        self.profiles_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_best_selected(&self) {
        self.best_selected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step_failure(&self) {
        self.step_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_time(&self, duration: Duration) {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.total_run_time_ms.fetch_add(ms, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get average pipeline time per started run in milliseconds
    pub fn avg_run_time_ms(&self) -> f64 {
        let total = self.total_run_time_ms.load(Ordering::Relaxed);
        let count = self.runs_started.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Auto Config Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Runs: {} started, {} skipped (busy), {} skipped (disabled), avg {:.0}ms",
            self.runs_started.load(Ordering::Relaxed),
            self.runs_skipped_busy.load(Ordering::Relaxed),
            self.runs_skipped_disabled.load(Ordering::Relaxed),
            self.avg_run_time_ms()
        );
        tracing::info!(
            "Profiles: {} imported, {} tested, {} removed, {} promotions",
            self.configs_imported.load(Ordering::Relaxed),
            self.profiles_tested.load(Ordering::Relaxed),
            self.profiles_removed.load(Ordering::Relaxed),
            self.best_selected.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Step failures: {}",
            self.step_failures.load(Ordering::Relaxed)
        );
    }
}

impl Default for WorkflowMetrics {
    fn default() -> Self {
        Self::new()
    }
}
