// Path: crates/types/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! Shared data model and error taxonomy for the view-call execution engine.
//!
//! This crate has no knowledge of Redis, `wasmtime`, or thread pools — it
//! defines the vocabulary (`Height`, `ContractId`, `RevisionHash`,
//! `AccountRecord`, `ViewError`, ...) that every other crate in the
//! workspace speaks.

/// Block heights, contract identifiers, and revision hashes.
pub mod ids;
/// The account record binary layout (spec §6).
pub mod account;
/// The stable error taxonomy surfaced by the coordinator (spec §7).
pub mod error;
/// Configuration types shared by the resolver, cache, pool, and engine.
pub mod config;

pub use account::AccountRecord;
pub use error::{ErrorCode, ViewError};
pub use ids::{ContractId, Height, RevisionHash};
