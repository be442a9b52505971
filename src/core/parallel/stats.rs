//! Executor statistics counters and snapshots.
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Monotonic counters updated by the executor without locking.
#[derive(Debug, Default)]
pub(crate) struct ExecutorStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    timed_out: AtomicU64,
    steal_transfers: AtomicU64,
    peak_concurrent: AtomicUsize,
    processing_micros: AtomicU64,
}

impl ExecutorStats {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, duration: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.processing_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Timeouts count as failures as well.
    pub fn record_timed_out(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_steal(&self) {
        self.steal_transfers.fetch_add(1, Ordering::Relaxed);
    }

    /// Raise the peak-concurrency gauge to `current` if it is higher.
    pub fn update_peak(&self, current: usize) {
        self.peak_concurrent.fetch_max(current, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        pending: usize,
        running: usize,
        queue_size: usize,
        started_at: Option<DateTime<Local>>,
    ) -> ExecutorStatistics {
        let completed = self.completed.load(Ordering::Relaxed);
        let total_processing =
            Duration::from_micros(self.processing_micros.load(Ordering::Relaxed));
        let avg_processing = if completed > 0 {
            total_processing / completed as u32
        } else {
            Duration::ZERO
        };
        ExecutorStatistics {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed,
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            pending,
            running,
            queue_size,
            peak_concurrent: self.peak_concurrent.load(Ordering::Relaxed),
            work_stealing_transfers: self.steal_transfers.load(Ordering::Relaxed),
            total_processing,
            avg_processing,
            started_at,
        }
    }
}

/// Point-in-time view of the executor's counters and gauges.
///
/// Counters are atomics and gauges are read under a brief lock, so a
/// snapshot taken concurrently with in-flight completions may be
/// transiently inconsistent (e.g. `submitted` one ahead of the terminal
/// counters); at quiescent points `submitted == completed + failed +
/// cancelled + pending + running` holds.
#[derive(Debug, Clone)]
pub struct ExecutorStatistics {
    /// Tasks accepted by `submit`
    pub submitted: u64,
    /// Tasks that finished successfully
    pub completed: u64,
    /// Tasks that failed, including timeouts
    pub failed: u64,
    /// Tasks cancelled before running
    pub cancelled: u64,
    /// Tasks that exceeded their deadline (also counted in `failed`)
    pub timed_out: u64,
    /// Submitted tasks not yet running or terminal
    pub pending: usize,
    /// Tasks currently executing
    pub running: usize,
    /// Entries currently sitting in ready queues
    pub queue_size: usize,
    /// Highest simultaneous running-task count observed
    pub peak_concurrent: usize,
    /// Cross-worker steal count under the work-stealing strategy
    pub work_stealing_transfers: u64,
    /// Sum of completed-task execution durations
    pub total_processing: Duration,
    /// `total_processing / completed`
    pub avg_processing: Duration,
    /// When the executor was started
    pub started_at: Option<DateTime<Local>>,
}
