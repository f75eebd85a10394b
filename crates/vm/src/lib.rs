// Path: crates/vm/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! The Host Bridge (spec §4.5): a `wasmtime`-backed implementation of
//! the platform's synchronous register-machine guest ABI, plus the
//! engine scaffolding (`Engine`, `Linker`, per-call `Store`) that
//! instantiates a compiled module and drives one invocation.

mod abi;
mod engine;
mod host_state;

pub use engine::{Invocation, VmEngine, VmEngineConfig};
pub use host_state::HostState;
