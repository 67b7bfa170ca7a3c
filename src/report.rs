//! Aggregated run results and summary rendering.
//!
//! A [`RunResult`] is assembled exactly once, after every worker has stopped,
//! from finalized worker summaries. Rendering is a pure function of the
//! result, so formatting the same result twice yields identical output.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::StressorKind;
use crate::worker::{WorkerStatus, WorkerSummary};

// ---------------------------------------------------------------------------
// RunResult
// ---------------------------------------------------------------------------

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// The deadline was reached and all workers drained normally.
    Completed,
    /// The run was stopped early by an external interrupt; counters are the
    /// partials accumulated up to the stop.
    Interrupted,
}

/// Column-wise sums over every worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub primes_found: u64,
    pub bytes_allocated: u64,
    pub bytes_touched: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connections_ok: u64,
    pub connections_failed: u64,
}

impl Totals {
    fn from_workers(workers: &[WorkerSummary]) -> Self {
        let mut t = Totals::default();
        for w in workers {
            t.primes_found += w.primes_found;
            t.bytes_allocated += w.bytes_allocated;
            t.bytes_touched += w.bytes_touched;
            t.bytes_sent += w.bytes_sent;
            t.bytes_received += w.bytes_received;
            t.connections_ok += w.connections_ok;
            t.connections_failed += w.connections_failed;
        }
        t
    }
}

/// Final report for one stress run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub kind: StressorKind,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub outcome: RunOutcome,
    /// Per-worker entries, ordered by worker index.
    pub workers: Vec<WorkerSummary>,
    pub totals: Totals,
}

impl RunResult {
    /// Build the result from finalized worker summaries. Entries are sorted
    /// by worker index for deterministic reporting; totals are computed here,
    /// once.
    pub fn assemble(
        run_id: Uuid,
        kind: StressorKind,
        started_at: DateTime<Utc>,
        elapsed_secs: f64,
        outcome: RunOutcome,
        mut workers: Vec<WorkerSummary>,
    ) -> Self {
        workers.sort_by_key(|w| w.index);
        let totals = Totals::from_workers(&workers);
        Self {
            run_id,
            kind,
            started_at,
            elapsed_secs,
            outcome,
            workers,
            totals,
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the human-readable summary block. Pure: the same result always
/// renders to the same string.
pub fn render_summary(result: &RunResult) -> String {
    let mut out = String::new();
    let push = |out: &mut String, line: String| {
        out.push_str(&line);
        out.push('\n');
    };

    push(&mut out, "=".repeat(60));
    push(&mut out, format!("{} STRESS RUN SUMMARY", result.kind.to_string().to_uppercase()));
    push(&mut out, "=".repeat(60));
    push(&mut out, format!("Run      : {}", result.run_id));
    push(
        &mut out,
        format!(
            "Started  : {}",
            result.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
    );
    push(&mut out, format!("Elapsed  : {:.2}s", result.elapsed_secs));
    push(
        &mut out,
        format!(
            "Outcome  : {}",
            match result.outcome {
                RunOutcome::Completed => "completed",
                RunOutcome::Interrupted => "interrupted (partial results)",
            }
        ),
    );
    push(&mut out, String::new());

    for w in &result.workers {
        push(&mut out, format!("  worker {:>3} : {}", w.index, worker_line(result.kind, w)));
    }
    push(&mut out, String::new());

    let t = &result.totals;
    match result.kind {
        StressorKind::Cpu => {
            push(&mut out, format!("Total primes found : {}", t.primes_found));
            push(
                &mut out,
                format!(
                    "Rate               : {:.0} primes/s",
                    rate(t.primes_found, result.elapsed_secs)
                ),
            );
        }
        StressorKind::Ram => {
            push(&mut out, format!("Bytes allocated    : {}", human_mib(t.bytes_allocated)));
            push(&mut out, format!("Bytes touched      : {}", human_mib(t.bytes_touched)));
            push(
                &mut out,
                format!(
                    "Touch throughput   : {:.2} MiB/s",
                    rate(t.bytes_touched, result.elapsed_secs) / (1024.0 * 1024.0)
                ),
            );
        }
        StressorKind::Network => {
            push(&mut out, format!("Bytes sent         : {}", human_mib(t.bytes_sent)));
            push(&mut out, format!("Bytes received     : {}", human_mib(t.bytes_received)));
            push(
                &mut out,
                format!(
                    "Connections        : {} ok, {} failed",
                    t.connections_ok, t.connections_failed
                ),
            );
            push(
                &mut out,
                format!(
                    "Throughput         : {:.2} MiB/s",
                    rate(t.bytes_sent + t.bytes_received, result.elapsed_secs)
                        / (1024.0 * 1024.0)
                ),
            );
        }
    }
    push(&mut out, "=".repeat(60));
    out
}

fn worker_line(kind: StressorKind, w: &WorkerSummary) -> String {
    let metrics = match kind {
        StressorKind::Cpu => format!("{} primes", w.primes_found),
        StressorKind::Ram => format!(
            "{} allocated, {} touched",
            human_mib(w.bytes_allocated),
            human_mib(w.bytes_touched)
        ),
        StressorKind::Network => format!(
            "{} sent, {} received, {} conn ok, {} failed",
            human_mib(w.bytes_sent),
            human_mib(w.bytes_received),
            w.connections_ok,
            w.connections_failed
        ),
    };
    match &w.status {
        WorkerStatus::Completed => metrics,
        WorkerStatus::Running => format!("{} (still running)", metrics),
        WorkerStatus::Failed(reason) => format!("{} (FAILED: {})", metrics, reason),
    }
}

fn human_mib(bytes: u64) -> String {
    format!("{:.2} MiB", bytes as f64 / (1024.0 * 1024.0))
}

fn rate(count: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    count as f64 / elapsed_secs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
