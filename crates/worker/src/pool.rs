// Path: crates/worker/src/pool.rs
//! The Worker Pool (spec §4.4): a fixed-capacity set of dedicated
//! threads, each a distinct sandboxed execution unit. Job handoff uses
//! an unbounded `crossbeam_channel` with one `Receiver` clone per
//! worker thread — the teacher's wider dependency graph already reaches
//! for `crossbeam-channel` for exactly this kind of multi-consumer work
//! queue — so "idle worker picks the next queued job, FIFO, no
//! priority" falls out of the channel's own delivery semantics rather
//! than needing bespoke scheduling code.
//!
//! A worker that reports `codeCompilation`, `panic`, `abort`, or
//! `timeout` is torn down and replaced with a fresh thread before the
//! current thread exits, per spec §7; `methodNotFound` and
//! `notImplemented` return the worker to the idle set untouched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{error, warn};
use viewd_telemetry::metrics;
use viewd_types::{ErrorCode, ViewError};
use viewd_vm::{Invocation, VmEngine};

use crate::job::WorkerJob;

/// Fixed-capacity pool sizing (spec §4.4 default: 10).
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    pub capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

struct Envelope {
    job: WorkerJob,
    reply: oneshot::Sender<Result<Invocation, ViewError>>,
}

struct Inner {
    vm: Arc<VmEngine>,
    runtime: Handle,
    sender: crossbeam_channel::Sender<Envelope>,
    receiver: crossbeam_channel::Receiver<Envelope>,
    next_worker_id: AtomicU64,
}

impl Inner {
    fn spawn_worker(self: Arc<Self>) {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let rx = self.receiver.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("view-worker-{worker_id}"))
            .spawn(move || Inner::worker_loop(self, worker_id, rx));
        if let Err(err) = spawned {
            error!(worker_id, %err, "failed to spawn view-worker thread");
        }
    }

    fn worker_loop(self: Arc<Self>, worker_id: u64, rx: crossbeam_channel::Receiver<Envelope>) {
        while let Ok(Envelope { job, reply }) = rx.recv() {
            let result = Self::run_job(&self.vm, &self.runtime, job);
            let fatal = matches!(&result, Err(e) if e.destroys_worker());
            let reason = result.as_ref().err().map(ErrorCode::code);
            if reply.send(result).is_err() {
                warn!(worker_id, "caller dropped before reply delivered");
            }
            if fatal {
                if let Some(reason) = reason {
                    metrics().inc_worker_replaced(reason);
                }
                warn!(worker_id, reason, "worker hit a fatal condition, replacing");
                self.spawn_worker();
                return;
            }
        }
    }

    fn run_job(vm: &VmEngine, runtime: &Handle, job: WorkerJob) -> Result<Invocation, ViewError> {
        let WorkerJob {
            module,
            contract,
            method_name,
            args,
            height,
            session,
            deadline,
        } = job;
        vm.invoke(
            &module,
            contract,
            height,
            &method_name,
            args,
            session,
            runtime.clone(),
            deadline,
        )
    }
}

/// Fixed-capacity pool of isolated execution contexts (spec §4.4).
/// Cheap to clone; every clone shares the same underlying threads and
/// job queue.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    /// Eagerly spawns `config.capacity` worker threads bound to `vm`.
    /// `runtime` is the Handle each worker uses to `block_on` the
    /// (async) resolver from inside synchronous host-function
    /// callbacks (spec §9's answer to the host/guest dialogue).
    pub fn new(vm: Arc<VmEngine>, runtime: Handle, config: WorkerPoolConfig) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let inner = Arc::new(Inner {
            vm,
            runtime,
            sender,
            receiver,
            next_worker_id: AtomicU64::new(0),
        });
        for _ in 0..config.capacity.max(1) {
            inner.clone().spawn_worker();
        }
        Self { inner }
    }

    /// Submits a job and awaits its result. Queuing is FIFO across all
    /// idle workers; there is no priority (spec §4.4 "Acquisition").
    pub async fn submit(&self, job: WorkerJob) -> Result<Invocation, ViewError> {
        let (reply, reply_rx) = oneshot::channel();
        metrics().set_worker_queue_depth(self.inner.sender.len() as u64);
        self.inner
            .sender
            .send(Envelope { job, reply })
            .map_err(|_| ViewError::Transient("worker pool is shut down".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ViewError::Transient("worker terminated before replying".to_string()))?
    }

    /// Number of jobs currently queued, waiting for an idle worker.
    pub fn queue_depth(&self) -> usize {
        self.inner.sender.len()
    }
}
