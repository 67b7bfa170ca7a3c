//! Network stressor: TCP byte-stream server and client roles.
//!
//! No application protocol is defined. The server consumes (and echoes) any
//! byte stream until EOF or shutdown; clients push arbitrary payload bytes.
//! All socket I/O is bounded by short poll slices so a stuck peer can never
//! hold a worker past the run deadline.

pub mod client;
pub mod server;

use std::time::Duration;

/// Read buffer size for both roles.
pub(crate) const READ_BUF: usize = 64 * 1024;

/// Upper bound on a single blocking I/O wait so loops re-check the deadline.
pub(crate) const POLL_SLICE: Duration = Duration::from_millis(250);
