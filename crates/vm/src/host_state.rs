// Path: crates/vm/src/host_state.rs
//! Per-invocation state threaded through every host import call
//! (spec §4.5). One [`HostState`] backs exactly one `Store`, created
//! fresh for each worker invocation and discarded afterward — no
//! host-visible state survives across calls (spec §3's worker
//! lifecycle invariant).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::runtime::Handle;
use viewd_resolver::ResolverSession;
use viewd_types::{ContractId, Height};
use wasmtime::StoreLimits;

/// A bridge-opened cursor over one contract's storage keys, backing
/// `storage_iter_prefix` / `storage_iter_range` / `storage_iter_next`.
pub(crate) struct IterState {
    pub pattern: Vec<u8>,
    pub end_exclusive: Option<Vec<u8>>,
    pub cursor: String,
    pub buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    pub exhausted: bool,
}

/// Carries a fatal guest condition out of a host import call as a
/// trap. `wasmtime` propagates this as the call's `anyhow::Error`;
/// [`crate::engine::translate_call_error`] downcasts it back out once
/// the call returns.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HostTrap(pub viewd_types::ViewError);

pub struct HostState {
    pub(crate) contract: ContractId,
    pub(crate) height: Height,
    pub(crate) input: Vec<u8>,
    pub(crate) registers: HashMap<u64, Vec<u8>>,
    pub(crate) logs: Vec<String>,
    pub(crate) return_value: Option<Vec<u8>>,
    pub(crate) iterators: HashMap<u64, IterState>,
    pub(crate) next_iter_id: u64,
    pub(crate) session: Arc<ResolverSession>,
    pub(crate) runtime: Handle,
    pub(crate) limits: StoreLimits,
}

impl HostState {
    pub fn new(
        contract: ContractId,
        height: Height,
        input: Vec<u8>,
        session: Arc<ResolverSession>,
        runtime: Handle,
        limits: StoreLimits,
    ) -> Self {
        Self {
            contract,
            height,
            input,
            registers: HashMap::new(),
            logs: Vec::new(),
            return_value: None,
            iterators: HashMap::new(),
            next_iter_id: 0,
            session,
            runtime,
            limits,
        }
    }

    pub fn take_parts(&mut self) -> (Option<Vec<u8>>, Vec<String>) {
        (self.return_value.take(), std::mem::take(&mut self.logs))
    }
}
