//! stresskit -- CPU, memory, and network stress testing from the command line.
//!
//! This crate provides the core library for the `stresskit` binary: three
//! stressor kernels (prime-counting CPU workers, allocate-and-touch RAM
//! workers, TCP server/client network workers) plus the coordination layer
//! that runs them against a shared deadline and aggregates per-worker
//! results into a uniform report.

pub mod config;
pub mod coordinator;
pub mod cpu;
pub mod error;
pub mod net;
pub mod ram;
pub mod report;
pub mod worker;
