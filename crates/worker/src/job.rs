// Path: crates/worker/src/job.rs
//! The unit of work submitted to the [`crate::WorkerPool`] (spec §4.4):
//! a compiled module paired with the call details needed to invoke one
//! exported method against a pinned resolver session.

use std::sync::Arc;
use std::time::Duration;

use viewd_resolver::ResolverSession;
use viewd_types::{ContractId, Height};
use wasmtime::Module;

/// `(compiled_module, C, method_name, method_args_bytes, pinned_H)`
/// from spec §4.4, plus the resolver session and deadline a worker
/// needs to actually run it.
pub struct WorkerJob {
    pub module: Module,
    pub contract: ContractId,
    pub method_name: String,
    pub args: Vec<u8>,
    pub height: Height,
    pub session: Arc<ResolverSession>,
    pub deadline: Duration,
}
