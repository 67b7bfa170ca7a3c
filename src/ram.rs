//! RAM stressor: allocate-and-touch worker threads.
//!
//! The requested size is split as evenly as possible across workers. The
//! budget is checked against the host's available memory before any worker
//! starts; a request that cannot be satisfied fails fast with an allocation
//! error rather than silently allocating less. Each worker allocates its
//! share once, then runs write-then-verify passes over the whole block until
//! the deadline, which keeps every page resident and actively exercised.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, info};

use crate::config::RamConfig;
use crate::error::StressError;
use crate::worker::{RunContext, Scoreboard, WorkerCell, WorkerSummary};

const MIB: u64 = 1024 * 1024;

/// Bytes written or verified between deadline checks.
const TOUCH_CHUNK: usize = 1 << 20;

/// Run the RAM stressor to completion. Blocks the calling thread; call from
/// `spawn_blocking` in async contexts.
pub fn run(
    cfg: &RamConfig,
    ctx: RunContext,
    board: &Scoreboard,
) -> Result<Vec<WorkerSummary>, StressError> {
    let available_mb = available_memory_bytes() / MIB;
    check_budget(cfg.size_mb, available_mb)?;

    let shares = split_shares(cfg.size_mb.saturating_mul(MIB), cfg.threads);
    let cells = board.register(cfg.threads);
    info!(
        workers = cfg.threads,
        total_mb = cfg.size_mb,
        duration_secs = cfg.duration_secs,
        "ram stressor starting"
    );

    let handles: Vec<thread::JoinHandle<Result<(), usize>>> = cells
        .iter()
        .zip(shares)
        .map(|(cell, share)| {
            let cell = Arc::clone(cell);
            let ctx = ctx.clone();
            thread::spawn(move || touch_worker(cell, ctx, share))
        })
        .collect();

    // A reservation failure in any worker is fatal: the budget check can pass
    // and the memory still be gone by the time the worker reserves its share.
    // The failing worker has already flipped the stop flag, so the others
    // wind down before the join.
    let mut reservation_failed = false;
    for (cell, handle) in cells.iter().zip(handles) {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(_share)) => reservation_failed = true,
            Err(_) => {
                tracing::warn!(worker = cell.index, "worker thread panicked");
                cell.fail("worker panicked");
            }
        }
    }
    if reservation_failed {
        return Err(StressError::Allocation {
            requested_mb: cfg.size_mb,
            available_mb: available_memory_bytes() / MIB,
        });
    }

    let summaries: Vec<WorkerSummary> = cells.iter().map(|c| c.summary()).collect();
    let touched: u64 = summaries.iter().map(|w| w.bytes_touched).sum();
    info!(bytes_touched = touched, "ram stressor finished");
    Ok(summaries)
}

/// Fail fast if the request exceeds what the host can currently provide.
pub(crate) fn check_budget(requested_mb: u64, available_mb: u64) -> Result<(), StressError> {
    if requested_mb > available_mb {
        return Err(StressError::Allocation {
            requested_mb,
            available_mb,
        });
    }
    Ok(())
}

fn available_memory_bytes() -> u64 {
    let sys = System::new_with_specifics(
        RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
    );
    sys.available_memory()
}

/// Split `total` bytes across `workers`, remainder going to the first ones.
pub(crate) fn split_shares(total: u64, workers: usize) -> Vec<usize> {
    let workers_u64 = workers as u64;
    let base = total / workers_u64;
    let remainder = total % workers_u64;
    (0..workers_u64)
        .map(|i| (base + u64::from(i < remainder)) as usize)
        .collect()
}

fn touch_worker(cell: Arc<WorkerCell>, ctx: RunContext, share: usize) -> Result<(), usize> {
    info!(worker = cell.index, bytes = share, "ram worker allocating");

    let mut block: Vec<u8> = Vec::new();
    if block.try_reserve_exact(share).is_err() {
        cell.fail(format!("allocation of {} bytes failed", share));
        // Fail the whole run, not just this worker: stop the siblings and
        // surface the shortfall to the caller.
        ctx.request_stop();
        return Err(share);
    }
    block.resize(share, 0);
    cell.counters
        .bytes_allocated
        .store(share as u64, Ordering::Relaxed);
    debug!(worker = cell.index, "ram worker allocated, touching");

    let mut pass: u8 = 0;
    'run: while !ctx.expired() {
        // Write pass: stamp a pass-dependent pattern across the block.
        let mut offset = 0;
        for chunk in block.chunks_mut(TOUCH_CHUNK) {
            stamp(chunk, offset, pass);
            offset += chunk.len();
            cell.counters
                .bytes_touched
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            if ctx.expired() {
                break 'run;
            }
        }

        // Verify pass: read the whole block back.
        let mut offset = 0;
        for chunk in block.chunks(TOUCH_CHUNK) {
            if !verify(chunk, offset, pass) {
                cell.fail("memory verification mismatch");
                return Ok(());
            }
            offset += chunk.len();
            cell.counters
                .bytes_touched
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            if ctx.expired() {
                break 'run;
            }
        }

        pass = pass.wrapping_add(1);
    }

    cell.complete();
    info!(
        worker = cell.index,
        bytes_touched = cell.counters.bytes_touched.load(Ordering::Relaxed),
        "ram worker finished"
    );
    Ok(())
}

// Folds the higher offset bits in so that two offsets a multiple of 256
// apart still stamp different bytes; a base misalignment is then visible
// to verify().
#[inline]
fn pattern_byte(offset: usize, pass: u8) -> u8 {
    (offset as u8) ^ ((offset >> 8) as u8).wrapping_mul(167) ^ pass.wrapping_mul(31)
}

fn stamp(chunk: &mut [u8], base: usize, pass: u8) {
    for (i, b) in chunk.iter_mut().enumerate() {
        *b = pattern_byte(base + i, pass);
    }
}

fn verify(chunk: &[u8], base: usize, pass: u8) -> bool {
    chunk
        .iter()
        .enumerate()
        .all(|(i, &b)| b == pattern_byte(base + i, pass))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
