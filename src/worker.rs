//! Shared worker substrate: run context, live counters, and the scoreboard.
//!
//! Every stressor kind builds on the same primitives. A [`RunContext`] carries
//! the wall-clock deadline and a stop flag; each worker polls it at bounded
//! intervals and exits cooperatively. A [`WorkerCell`] holds one worker's live
//! counters as atomics so the coordinator can take a best-effort snapshot at
//! any moment, including after a forced stop. The [`Scoreboard`] is the
//! per-run registry of cells.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Deadline and stop flag shared by every worker of one run.
///
/// Both values are effectively read-only from a worker's perspective: the
/// deadline is fixed at construction and the stop flag is flipped at most
/// once, by the coordinator. Workers never write here, so no locking is
/// needed anywhere on the hot path.
#[derive(Clone)]
pub struct RunContext {
    deadline: Instant,
    stop: Arc<AtomicBool>,
}

impl RunContext {
    /// Create a context whose deadline is `duration` from now.
    pub fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True once the deadline has passed or a stop was requested.
    pub fn expired(&self) -> bool {
        self.stop.load(Ordering::Relaxed) || Instant::now() >= self.deadline
    }

    /// Ask all workers holding this context to wind down.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// True only if an explicit stop was requested (deadline not counted).
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Time left before the deadline; zero if expired or stopped.
    pub fn remaining(&self) -> Duration {
        if self.stop.load(Ordering::Relaxed) {
            return Duration::ZERO;
        }
        self.deadline.saturating_duration_since(Instant::now())
    }
}

// ---------------------------------------------------------------------------
// Worker counters and status
// ---------------------------------------------------------------------------

/// Live counters owned by one worker.
///
/// Each stressor kind uses the fields relevant to it and leaves the rest at
/// zero; the report renders only the columns that apply. Keeping one flat
/// struct lets the coordinator snapshot any worker without knowing its kind.
#[derive(Debug, Default)]
pub struct Counters {
    pub primes_found: AtomicU64,
    pub bytes_allocated: AtomicU64,
    pub bytes_touched: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub connections_ok: AtomicU64,
    pub connections_failed: AtomicU64,
}

/// Terminal (or current) state of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Running,
    Completed,
    Failed(String),
}

/// One worker's slot on the scoreboard: index, counters, status.
///
/// Exclusively driven by its worker while the run is live; the coordinator
/// only reads. Counters survive a worker panic, so a crashed worker still
/// contributes its last-known progress.
pub struct WorkerCell {
    pub index: usize,
    pub counters: Counters,
    status: Mutex<WorkerStatus>,
}

impl WorkerCell {
    fn new(index: usize) -> Self {
        Self {
            index,
            counters: Counters::default(),
            status: Mutex::new(WorkerStatus::Running),
        }
    }

    /// Mark the worker as finished normally.
    pub fn complete(&self) {
        let mut status = self.status.lock().unwrap_or_else(|p| p.into_inner());
        if *status == WorkerStatus::Running {
            *status = WorkerStatus::Completed;
        }
    }

    /// Mark the worker as failed. A worker that already completed keeps its
    /// completed status.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut status = self.status.lock().unwrap_or_else(|p| p.into_inner());
        if *status == WorkerStatus::Running {
            *status = WorkerStatus::Failed(reason.into());
        }
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Point-in-time snapshot of this worker's counters and status.
    pub fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            index: self.index,
            status: self.status(),
            primes_found: self.counters.primes_found.load(Ordering::Relaxed),
            bytes_allocated: self.counters.bytes_allocated.load(Ordering::Relaxed),
            bytes_touched: self.counters.bytes_touched.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            connections_ok: self.counters.connections_ok.load(Ordering::Relaxed),
            connections_failed: self.counters.connections_failed.load(Ordering::Relaxed),
        }
    }
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Finalized view of one worker, as it appears in the run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerSummary {
    pub index: usize,
    pub status: WorkerStatus,
    #[serde(skip_serializing_if = "is_zero")]
    pub primes_found: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub bytes_allocated: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub bytes_touched: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub bytes_sent: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub bytes_received: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub connections_ok: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub connections_failed: u64,
}

// ---------------------------------------------------------------------------
// Scoreboard
// ---------------------------------------------------------------------------

/// Registry of all worker cells for one run.
///
/// Stressors register their workers here at launch; the coordinator keeps a
/// clone so it can snapshot partial progress if workers fail to drain within
/// the grace period after an interrupt.
#[derive(Clone, Default)]
pub struct Scoreboard {
    cells: Arc<Mutex<Vec<Arc<WorkerCell>>>>,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `count` new workers, returning their cells. Indices continue
    /// from any previously registered workers.
    pub fn register(&self, count: usize) -> Vec<Arc<WorkerCell>> {
        let mut cells = self.cells.lock().unwrap_or_else(|p| p.into_inner());
        let base = cells.len();
        let new: Vec<Arc<WorkerCell>> = (0..count)
            .map(|i| Arc::new(WorkerCell::new(base + i)))
            .collect();
        cells.extend(new.iter().cloned());
        new
    }

    /// Snapshot every registered worker, ordered by index.
    pub fn snapshot(&self) -> Vec<WorkerSummary> {
        let cells = self.cells.lock().unwrap_or_else(|p| p.into_inner());
        let mut summaries: Vec<WorkerSummary> = cells.iter().map(|c| c.summary()).collect();
        summaries.sort_by_key(|w| w.index);
        summaries
    }

    pub fn len(&self) -> usize {
        self.cells.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Thread join helper
// ---------------------------------------------------------------------------

/// Join an OS-thread worker. A panic is converted into a failed status on the
/// cell; the counters written up to the panic are kept.
pub fn join_thread(cell: &WorkerCell, handle: std::thread::JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::warn!(worker = cell.index, "worker thread panicked");
        cell.fail("worker panicked");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_expires_after_duration() {
        let ctx = RunContext::new(Duration::from_millis(20));
        assert!(!ctx.expired());
        std::thread::sleep(Duration::from_millis(40));
        assert!(ctx.expired());
    }

    #[test]
    fn test_context_stop_overrides_deadline() {
        let ctx = RunContext::new(Duration::from_secs(3600));
        assert!(!ctx.expired());
        assert!(ctx.remaining() > Duration::from_secs(3500));
        ctx.request_stop();
        assert!(ctx.expired());
        assert!(ctx.stop_requested());
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_context_clones_share_the_stop_flag() {
        let ctx = RunContext::new(Duration::from_secs(3600));
        let clone = ctx.clone();
        ctx.request_stop();
        assert!(clone.expired());
    }

    #[test]
    fn test_cell_status_transitions() {
        let cell = WorkerCell::new(0);
        assert_eq!(cell.status(), WorkerStatus::Running);
        cell.complete();
        assert_eq!(cell.status(), WorkerStatus::Completed);
        // A completed worker does not become failed retroactively.
        cell.fail("late fault");
        assert_eq!(cell.status(), WorkerStatus::Completed);
    }

    #[test]
    fn test_cell_fail_records_reason() {
        let cell = WorkerCell::new(3);
        cell.fail("connection refused");
        assert_eq!(
            cell.status(),
            WorkerStatus::Failed("connection refused".into())
        );
    }

    #[test]
    fn test_scoreboard_indices_are_consecutive() {
        let board = Scoreboard::new();
        let first = board.register(3);
        let second = board.register(2);
        let indices: Vec<usize> = first
            .iter()
            .chain(second.iter())
            .map(|c| c.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(board.len(), 5);
    }

    #[test]
    fn test_snapshot_is_ordered_and_carries_counters() {
        let board = Scoreboard::new();
        let cells = board.register(2);
        cells[1].counters.primes_found.store(42, Ordering::Relaxed);
        cells[1].complete();
        let snap = board.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].index, 0);
        assert_eq!(snap[1].index, 1);
        assert_eq!(snap[1].primes_found, 42);
        assert_eq!(snap[1].status, WorkerStatus::Completed);
        assert_eq!(snap[0].status, WorkerStatus::Running);
    }

    #[test]
    fn test_join_thread_converts_panic_to_failure() {
        let board = Scoreboard::new();
        let cell = board.register(1).remove(0);
        let worker = Arc::clone(&cell);
        let handle = std::thread::spawn(move || {
            worker.counters.primes_found.store(7, Ordering::Relaxed);
            panic!("boom");
        });
        join_thread(&cell, handle);
        assert_eq!(cell.status(), WorkerStatus::Failed("worker panicked".into()));
        // Progress made before the panic is kept.
        assert_eq!(cell.summary().primes_found, 7);
    }
}
