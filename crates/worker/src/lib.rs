// Path: crates/worker/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! The Worker Pool (spec §4.4): a fixed-size pool of isolated
//! execution contexts. Each worker, on demand, instantiates a compiled
//! module with a fresh Host Bridge, runs one method, returns its
//! outputs, and is returned to the pool — or, on a fatal guest
//! condition, is torn down and replaced.

mod job;
mod pool;

pub use job::WorkerJob;
pub use pool::{WorkerPool, WorkerPoolConfig};
