//! Error taxonomy for stress runs.
//!
//! Only configuration and resource-acquisition failures are fatal to a run.
//! Per-worker runtime faults (connect errors, verify mismatches, panics) are
//! recorded on the worker's cell and reported in aggregate; they never abort
//! the coordinator or the other workers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StressError {
    /// Rejected parameters. The run never starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The RAM stressor could not acquire the requested memory.
    #[error("allocation failed: requested {requested_mb} MB but only {available_mb} MB available")]
    Allocation { requested_mb: u64, available_mb: u64 },

    /// The network server could not bind its listen address. No retry.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl StressError {
    /// Process exit code for a fatal error. Normal completion (including a
    /// deadline-triggered stop or an interrupted-but-reported run) exits 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            StressError::Config(_) => 2,
            StressError::Allocation { .. } => 3,
            StressError::Bind { .. } => 4,
        }
    }
}
