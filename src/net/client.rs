//! Client role: concurrent connection workers pushing payload bytes.
//!
//! Each worker owns one connection. Connect failures are a stress signal,
//! not something to retry: the worker records the failure and stops while
//! the others continue. A connected worker loops sending a bounded payload
//! and draining whatever the peer echoes back, until the deadline.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::info;

use super::{POLL_SLICE, READ_BUF};
use crate::worker::{RunContext, Scoreboard, WorkerCell, WorkerSummary};

/// Run `clients` connection workers against `host:port` until the deadline.
pub async fn run(
    host: &str,
    port: u16,
    clients: usize,
    ctx: RunContext,
    board: &Scoreboard,
    payload_len: usize,
    connect_timeout: Duration,
) -> Vec<WorkerSummary> {
    let addr = format!("{}:{}", host, port);
    let cells = board.register(clients);
    info!(workers = clients, target = %addr, "client stressor starting");

    let handles: Vec<tokio::task::JoinHandle<()>> = cells
        .iter()
        .map(|cell| {
            let cell = Arc::clone(cell);
            let ctx = ctx.clone();
            let addr = addr.clone();
            let payload = make_payload(payload_len);
            tokio::spawn(async move {
                connection_worker(addr, cell, ctx, payload, connect_timeout).await;
            })
        })
        .collect();

    for (cell, handle) in cells.iter().zip(handles) {
        if handle.await.is_err() {
            cell.fail("worker panicked");
        }
    }

    let summaries: Vec<WorkerSummary> = cells.iter().map(|c| c.summary()).collect();
    let sent: u64 = summaries.iter().map(|w| w.bytes_sent).sum();
    let failed: u64 = summaries.iter().map(|w| w.connections_failed).sum();
    info!(bytes_sent = sent, failed_connections = failed, "client stressor finished");
    summaries
}

/// Arbitrary payload bytes; content is irrelevant to the wire contract.
fn make_payload(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill(&mut buf[..]);
    buf
}

async fn connection_worker(
    addr: String,
    cell: Arc<WorkerCell>,
    ctx: RunContext,
    payload: Vec<u8>,
    connect_timeout: Duration,
) {
    info!(worker = cell.index, target = %addr, "client worker connecting");

    let mut stream = match timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(s)) => {
            cell.counters.connections_ok.fetch_add(1, Ordering::Relaxed);
            s
        }
        Ok(Err(e)) => {
            cell.counters
                .connections_failed
                .fetch_add(1, Ordering::Relaxed);
            cell.fail(format!("connect to {} failed: {}", addr, e));
            return;
        }
        Err(_) => {
            cell.counters
                .connections_failed
                .fetch_add(1, Ordering::Relaxed);
            cell.fail(format!("connect to {} timed out", addr));
            return;
        }
    };

    let mut readbuf = vec![0u8; READ_BUF];
    while !ctx.expired() {
        // A full payload write is counted only once it completes, so the
        // sent total never includes a partially transmitted buffer. The
        // write is still bounded: it cannot outlive the deadline plus one
        // poll slice.
        let bound = ctx.remaining() + POLL_SLICE;
        match timeout(bound, stream.write_all(&payload)).await {
            Ok(Ok(())) => {
                cell.counters
                    .bytes_sent
                    .fetch_add(payload.len() as u64, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                cell.fail(format!("write failed: {}", e));
                return;
            }
            Err(_) => {
                cell.fail("write stalled past deadline");
                return;
            }
        }

        // Drain whatever response has arrived; the peer is not required to
        // send anything.
        if let Ok(Ok(n)) = timeout(POLL_SLICE, stream.read(&mut readbuf)).await {
            if n > 0 {
                cell.counters
                    .bytes_received
                    .fetch_add(n as u64, Ordering::Relaxed);
            }
        }
    }

    // Signal EOF so the server can finalize its receive count promptly, then
    // drain any echo still in flight.
    let _ = stream.shutdown().await;
    loop {
        match timeout(POLL_SLICE, stream.read(&mut readbuf)).await {
            Ok(Ok(n)) if n > 0 => {
                cell.counters
                    .bytes_received
                    .fetch_add(n as u64, Ordering::Relaxed);
            }
            _ => break,
        }
    }

    cell.complete();
    info!(
        worker = cell.index,
        bytes_sent = cell.counters.bytes_sent.load(Ordering::Relaxed),
        bytes_received = cell.counters.bytes_received.load(Ordering::Relaxed),
        "client worker finished"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_fails_only_that_worker() {
        // Bind then drop to obtain a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let ctx = RunContext::new(Duration::from_millis(500));
        let board = Scoreboard::new();
        let summaries = run(
            "127.0.0.1",
            port,
            2,
            ctx,
            &board,
            1024,
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(summaries.len(), 2);
        for w in &summaries {
            assert_eq!(w.connections_ok, 0);
            assert_eq!(w.connections_failed, 1);
            assert!(matches!(w.status, crate::worker::WorkerStatus::Failed(_)));
        }
    }

    #[tokio::test]
    async fn test_payload_has_requested_length() {
        assert_eq!(make_payload(64 * 1024).len(), 64 * 1024);
        assert_eq!(make_payload(1).len(), 1);
    }
}
