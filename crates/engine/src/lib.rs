// Path: crates/engine/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! The View-Call Coordinator (spec §4.6): the top-level operation that
//! accepts `(contract-id, method-name, argument-blob)`, pins a block
//! height, resolves code, acquires a worker, executes, and returns
//! `(result, logs, block-height)`.
//!
//! `ViewEngine` is the single owned value spec §9 calls for in place of
//! the source's ambient singletons: it owns the store handle, state
//! resolver, module cache, and worker pool. Every other component stays
//! oblivious to the others — the coordinator is the only place that
//! sees all of H, R, M, and the worker in one place.

use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;
use tracing::instrument;
use viewd_cache::ModuleCache;
use viewd_resolver::StateResolver;
use viewd_store::VersionedStore;
use viewd_telemetry::metrics;
pub use viewd_types::config::EngineConfig;
use viewd_types::{ContractId, ErrorCode, Height, ViewError};
use viewd_vm::{VmEngine, VmEngineConfig};
use viewd_worker::{WorkerJob, WorkerPool, WorkerPoolConfig};

/// The result of a successful `view()` call: the guest's return-value
/// buffer, its accumulated logs, and the block height the call was
/// pinned to (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOutcome {
    pub result: Vec<u8>,
    pub logs: Vec<String>,
    pub height: Height,
}

/// Owns every stateful collaborator the coordinator needs: the
/// versioned store handle, the state resolver, the module cache, and
/// the worker pool. Cheap to clone — every clone shares the same
/// underlying cache and pool.
#[derive(Clone)]
pub struct ViewEngine {
    resolver: StateResolver,
    cache: Arc<ModuleCache>,
    pool: WorkerPool,
    config: EngineConfig,
}

impl ViewEngine {
    /// Builds the engine's owned collaborators: a `wasmtime::Engine`
    /// configured for epoch interruption, an unbounded module cache
    /// atop it, and a fixed-capacity worker pool. `runtime` is the
    /// Handle workers use to call back into the (async) resolver from
    /// inside synchronous host-function callbacks.
    pub fn new(
        store: Arc<dyn VersionedStore>,
        runtime: Handle,
        config: EngineConfig,
    ) -> Result<Self, ViewError> {
        let resolver = StateResolver::new(store, config.latest_height_ttl());

        let vm = Arc::new(VmEngine::new(&VmEngineConfig {
            max_memory_pages: config.max_memory_pages,
        })?);
        let cache = Arc::new(ModuleCache::new(vm.engine().clone(), config.compile_threads)?);
        let pool = WorkerPool::new(
            vm,
            runtime,
            WorkerPoolConfig {
                capacity: config.pool_size,
            },
        );

        Ok(Self {
            resolver,
            cache,
            pool,
            config,
        })
    }

    /// Number of jobs currently queued, waiting for an idle worker.
    pub fn queue_depth(&self) -> usize {
        self.pool.queue_depth()
    }

    /// Runs one view call end to end (spec §4.6, steps 1-5), bounded by
    /// the configured per-call deadline shared across every store
    /// lookup and the guest invocation itself (spec §5 "Timeouts").
    #[instrument(skip(self, args), fields(contract = %contract, method = method_name))]
    pub async fn view(
        &self,
        contract: ContractId,
        method_name: &str,
        args: Vec<u8>,
    ) -> Result<ViewOutcome, ViewError> {
        let started_at = Instant::now();
        let outcome = match tokio::time::timeout(
            self.config.call_deadline(),
            self.view_uncapped(contract, method_name, args),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ViewError::Timeout),
        };

        let tag = match &outcome {
            Ok(_) => "ok",
            Err(err) => err.code(),
        };
        metrics().inc_view_calls_total(tag);
        metrics().observe_view_latency(started_at.elapsed().as_secs_f64());
        outcome
    }

    async fn view_uncapped(
        &self,
        contract: ContractId,
        method_name: &str,
        args: Vec<u8>,
    ) -> Result<ViewOutcome, ViewError> {
        // Step 1: pin H.
        let height = self.resolver.latest_height().await?;
        let session = Arc::new(self.resolver.session(height));

        // Step 2: resolve code revision.
        let revision = session
            .code_revision(&contract)
            .await?
            .ok_or(ViewError::CodeNotFound)?;

        // Step 3: obtain the compiled module, fetching the blob only
        // on cache miss.
        let fetch_contract = contract.clone();
        let fetch_revision = revision.clone();
        let fetch_session = session.clone();
        let module = self
            .cache
            .get_or_compile(&contract, &revision, move || async move {
                fetch_session
                    .code_blob(&fetch_contract, &fetch_revision)
                    .await?
                    .ok_or(ViewError::CodeNotFound)
            })
            .await?;

        // Step 4 & 5: acquire a worker, submit, and await the result.
        let job = WorkerJob {
            module,
            contract,
            method_name: method_name.to_string(),
            args,
            height,
            session,
            deadline: self.config.call_deadline(),
        };
        let invocation = self.pool.submit(job).await?;

        Ok(ViewOutcome {
            result: invocation.result,
            logs: invocation.logs,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewd_store::testing::MemoryStore;

    fn seed_trivial_contract(store: &MemoryStore, contract: &str, height: u64, wat: &str) {
        let wasm = wat::parse_str(wat).expect("wat::parse_str is only reached in tests");
        store.put(b"latest_block_height".to_vec(), height.to_string().into_bytes());
        store.put_versioned(format!("code:{contract}").into_bytes(), height, b"r1".to_vec());
        store.put(format!("code:{contract}:r1").into_bytes(), wasm);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn happy_view_returns_value_return_bytes() {
        let store = Arc::new(MemoryStore::new());
        seed_trivial_contract(
            &store,
            "alice.near",
            100,
            r#"(module
                (import "env" "value_return" (func $value_return (param i32 i32)))
                (memory (export "memory") 1)
                (data (i32.const 0) "ok")
                (func (export "hello")
                    i32.const 2
                    i32.const 0
                    call $value_return)
            )"#,
        );
        let engine = ViewEngine::new(store, Handle::current(), EngineConfig::default()).unwrap();

        let outcome = engine
            .view(ContractId::from("alice.near"), "hello", vec![])
            .await
            .unwrap();
        assert_eq!(outcome.result, b"ok");
        assert_eq!(outcome.height, Height(100));
        assert!(outcome.logs.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_method_reports_method_not_found() {
        let store = Arc::new(MemoryStore::new());
        seed_trivial_contract(
            &store,
            "alice.near",
            100,
            r#"(module (memory (export "memory") 1) (func (export "hello")))"#,
        );
        let engine = ViewEngine::new(store, Handle::current(), EngineConfig::default()).unwrap();

        let err = engine
            .view(ContractId::from("alice.near"), "nope", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ViewError::MethodNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_code_revision_reports_code_not_found() {
        let store = Arc::new(MemoryStore::new());
        store.put(b"latest_block_height".to_vec(), b"100".to_vec());
        let engine = ViewEngine::new(store, Handle::current(), EngineConfig::default()).unwrap();

        let err = engine
            .view(ContractId::from("nobody.near"), "hello", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ViewError::CodeNotFound));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn storage_read_reflects_value_pinned_at_call_height() {
        let store = Arc::new(MemoryStore::new());
        seed_trivial_contract(
            &store,
            "alice.near",
            100,
            r#"(module
                (import "env" "storage_read" (func $storage_read (param i32 i32 i64) (result i64)))
                (import "env" "read_register" (func $read_register (param i64 i32)))
                (import "env" "value_return" (func $value_return (param i32 i32)))
                (memory (export "memory") 1)
                (data (i32.const 0) "k")
                (func (export "get")
                    i32.const 1
                    i32.const 0
                    i64.const 0
                    call $storage_read
                    drop
                    i64.const 0
                    i32.const 10
                    call $read_register
                    i32.const 1
                    i32.const 10
                    call $value_return)
            )"#,
        );
        store.put_versioned(b"data:alice.near:k".to_vec(), 40, b"r1".to_vec());
        store.put(b"data-value:alice.near:k:r1".to_vec(), b"v".to_vec());

        let engine = ViewEngine::new(store, Handle::current(), EngineConfig::default()).unwrap();
        let outcome = engine
            .view(ContractId::from("alice.near"), "get", vec![])
            .await
            .unwrap();
        assert_eq!(outcome.result, b"v");
    }

    // Spec §8 scenario 6 ("not-implemented fallback"), end to end
    // through the coordinator: a view method that writes storage
    // observes `notImplemented` rather than silently succeeding.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn storage_write_surfaces_not_implemented_through_the_coordinator() {
        let store = Arc::new(MemoryStore::new());
        seed_trivial_contract(
            &store,
            "alice.near",
            100,
            r#"(module
                (import "env" "storage_write" (func $storage_write (param i32 i32 i32 i32 i64) (result i64)))
                (memory (export "memory") 1)
                (func (export "set")
                    i32.const 0
                    i32.const 0
                    i32.const 0
                    i32.const 0
                    i64.const 0
                    call $storage_write
                    drop)
            )"#,
        );
        let engine = ViewEngine::new(store, Handle::current(), EngineConfig::default()).unwrap();

        let err = engine
            .view(ContractId::from("alice.near"), "set", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ViewError::NotImplemented(ref name) if name == "storage_write"));
    }
}
