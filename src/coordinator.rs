//! Run orchestration: dispatch by stressor kind, deadline and interrupt
//! handling, result aggregation.
//!
//! One run moves through a single path: validate the config, build the shared
//! [`RunContext`] and [`Scoreboard`], start the selected stressor's workers,
//! and wait for them to drain. On Ctrl-C the stop flag is flipped and the
//! workers get a bounded grace period; if any of them fail to drain in time
//! the scoreboard is snapshotted so the report still carries every worker's
//! partial counters. An interrupted run reports, it never just dies.

use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{NetMode, StressConfig, Tunables};
use crate::error::StressError;
use crate::net;
use crate::report::{RunOutcome, RunResult};
use crate::worker::{RunContext, Scoreboard, WorkerSummary};

/// Slack on top of the grace period so workers that stopped right at the
/// bound still get joined instead of being snapshotted as running.
const DRAIN_SLACK: Duration = Duration::from_millis(500);

/// Execute one stress run end to end, including Ctrl-C handling.
pub async fn execute(cfg: StressConfig, tunables: Tunables) -> Result<RunResult, StressError> {
    cfg.validate()?;

    let run_id = Uuid::new_v4();
    let kind = cfg.kind();
    let started_at = Utc::now();
    let started = Instant::now();
    let ctx = RunContext::new(cfg.duration());
    let board = Scoreboard::new();

    info!(
        %run_id,
        %kind,
        duration_secs = cfg.duration().as_secs(),
        "run starting"
    );

    let fut = run_stressor(cfg, ctx.clone(), board.clone(), tunables.clone());
    tokio::pin!(fut);

    let (workers, outcome) = tokio::select! {
        res = &mut fut => (res?, RunOutcome::Completed),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received, stopping workers");
            ctx.request_stop();
            match timeout(tunables.grace_period() + DRAIN_SLACK, &mut fut).await {
                Ok(res) => (res?, RunOutcome::Interrupted),
                Err(_) => {
                    warn!("workers did not drain within the grace period, reporting partial counters");
                    (board.snapshot(), RunOutcome::Interrupted)
                }
            }
        }
    };

    let elapsed_secs = started.elapsed().as_secs_f64();
    let result = RunResult::assemble(run_id, kind, started_at, elapsed_secs, outcome, workers);
    info!(
        %run_id,
        elapsed_secs,
        workers = result.workers.len(),
        "run finished"
    );
    Ok(result)
}

/// Start the configured stressor and wait for all its workers.
///
/// CPU and RAM workers are OS threads (true parallelism across cores) driven
/// through `spawn_blocking`; the network roles are tokio tasks. A panic of a
/// whole blocking stressor task is downgraded to a partial-counter snapshot
/// rather than crashing the run.
pub async fn run_stressor(
    cfg: StressConfig,
    ctx: RunContext,
    board: Scoreboard,
    tunables: Tunables,
) -> Result<Vec<WorkerSummary>, StressError> {
    match cfg {
        StressConfig::Cpu(c) => {
            let worker_board = board.clone();
            match tokio::task::spawn_blocking(move || crate::cpu::run(&c, ctx, &worker_board))
                .await
            {
                Ok(workers) => Ok(workers),
                Err(e) => {
                    error!(error = %e, "cpu stressor task failed, reporting partial counters");
                    Ok(board.snapshot())
                }
            }
        }
        StressConfig::Ram(c) => {
            let worker_board = board.clone();
            match tokio::task::spawn_blocking(move || crate::ram::run(&c, ctx, &worker_board))
                .await
            {
                Ok(res) => res,
                Err(e) => {
                    error!(error = %e, "ram stressor task failed, reporting partial counters");
                    Ok(board.snapshot())
                }
            }
        }
        StressConfig::Network(c) => match c.mode {
            NetMode::Server => {
                let listener = net::server::bind(&c.host, c.port).await?;
                net::server::run(listener, ctx, &board, tunables.grace_period()).await
            }
            NetMode::Client => Ok(net::client::run(
                &c.host,
                c.port,
                c.clients,
                ctx,
                &board,
                tunables.payload_len(),
                tunables.connect_timeout(),
            )
            .await),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CpuConfig;

    #[tokio::test]
    async fn test_execute_rejects_invalid_config() {
        let cfg = StressConfig::Cpu(CpuConfig {
            cores: 0,
            duration_secs: 10,
        });
        let err = execute(cfg, Tunables::default()).await.unwrap_err();
        assert!(matches!(err, StressError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_run_stressor_cpu_yields_one_entry_per_core() {
        let cfg = StressConfig::Cpu(CpuConfig {
            cores: 2,
            duration_secs: 1,
        });
        let ctx = RunContext::new(Duration::from_millis(150));
        let board = Scoreboard::new();
        let workers = run_stressor(cfg, ctx, board, Tunables::default())
            .await
            .unwrap();
        assert_eq!(workers.len(), 2);
        assert!(workers.iter().all(|w| w.primes_found > 0));
    }

    #[tokio::test]
    async fn test_run_stressor_server_bind_conflict_is_fatal() {
        let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = holder.local_addr().unwrap().port();
        let cfg = StressConfig::Network(crate::config::NetworkConfig {
            mode: NetMode::Server,
            host: "127.0.0.1".into(),
            port,
            clients: 0,
            duration_secs: 1,
        });
        let ctx = RunContext::new(Duration::from_secs(1));
        let board = Scoreboard::new();
        let err = run_stressor(cfg, ctx, board.clone(), Tunables::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StressError::Bind { .. }));
        assert!(board.is_empty());
    }
}
