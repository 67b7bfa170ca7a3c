//! Server role: accept connections until the deadline, count and echo every
//! byte.
//!
//! State machine: bind, then accept in a loop until the deadline or a stop
//! request; each accepted connection is served in its own task so a slow
//! peer never blocks the accept loop. After the deadline the listener is
//! dropped, in-flight connections get a bounded grace period to reach EOF,
//! and anything still open is force-closed.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{POLL_SLICE, READ_BUF};
use crate::error::StressError;
use crate::worker::{RunContext, Scoreboard, WorkerCell, WorkerSummary};

/// Bind the listen address. Failure (address in use, permission denied) is
/// immediate and fatal; there is no retry.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, StressError> {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr).await.map_err(|e| StressError::Bind {
        addr: addr.clone(),
        source: e,
    })
}

/// Run the server role on an already-bound listener until the deadline.
///
/// The server occupies a single scoreboard slot; its counters aggregate all
/// connections it serves.
pub async fn run(
    listener: TcpListener,
    ctx: RunContext,
    board: &Scoreboard,
    grace: Duration,
) -> Result<Vec<WorkerSummary>, StressError> {
    if let Ok(local) = listener.local_addr() {
        info!(addr = %local, "server listening");
    }

    let cell = board.register(1).remove(0);
    let mut handlers = JoinSet::new();

    while !ctx.expired() {
        let wait = ctx.remaining().min(POLL_SLICE);
        match timeout(wait, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                let served = cell.counters.connections_ok.fetch_add(1, Ordering::Relaxed) + 1;
                info!(peer = %peer, connection = served, "connection accepted");
                let cell = Arc::clone(&cell);
                let ctx = ctx.clone();
                handlers.spawn(async move {
                    serve_connection(stream, cell, ctx).await;
                });
            }
            Ok(Err(e)) => {
                warn!(error = %e, "accept failed");
            }
            // Wait slice elapsed with no connection; loop re-checks the deadline.
            Err(_) => {}
        }
    }
    drop(listener);

    // Let in-flight connections drain to EOF, then force-close the rest.
    let drained = timeout(grace, async {
        while handlers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("grace period elapsed, closing remaining connections");
        handlers.abort_all();
        while handlers.join_next().await.is_some() {}
    }

    cell.complete();
    info!(
        connections = cell.counters.connections_ok.load(Ordering::Relaxed),
        bytes_received = cell.counters.bytes_received.load(Ordering::Relaxed),
        "server stopped"
    );
    Ok(vec![cell.summary()])
}

/// Serve one connection: read until peer EOF, counting bytes received, and
/// echo everything back. Exits early once the deadline has passed and the
/// peer has gone quiet.
async fn serve_connection(mut stream: TcpStream, cell: Arc<WorkerCell>, ctx: RunContext) {
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = match timeout(POLL_SLICE, stream.read(&mut buf)).await {
            Ok(Ok(0)) => break, // peer closed
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!(error = %e, "connection read error");
                break;
            }
            Err(_) => {
                if ctx.expired() {
                    break;
                }
                continue;
            }
        };

        cell.counters
            .bytes_received
            .fetch_add(n as u64, Ordering::Relaxed);

        if let Err(e) = stream.write_all(&buf[..n]).await {
            debug!(error = %e, "echo write failed");
            break;
        }
        cell.counters
            .bytes_sent
            .fetch_add(n as u64, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_a_bind_error() {
        let first = bind("127.0.0.1", 0).await.unwrap();
        let port = first.local_addr().unwrap().port();
        let err = bind("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, StressError::Bind { .. }));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_server_counts_and_echoes_bytes() {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = RunContext::new(Duration::from_secs(10));
        let board = Scoreboard::new();

        let server_ctx = ctx.clone();
        let server_board = board.clone();
        let server = tokio::spawn(async move {
            run(listener, server_ctx, &server_board, Duration::from_secs(2)).await
        });

        let payload = b"0123456789abcdef";
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(payload).await.unwrap();
        let mut echoed = vec![0u8; payload.len()];
        stream.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, payload);
        drop(stream);

        ctx.request_stop();
        let summaries = server.await.unwrap().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].connections_ok, 1);
        assert_eq!(summaries[0].bytes_received, payload.len() as u64);
        assert_eq!(summaries[0].bytes_sent, payload.len() as u64);
    }
}
