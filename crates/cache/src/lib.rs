// Path: crates/cache/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! The Module Cache (spec §4.3): maps `(ContractId, RevisionHash)` to a
//! compiled, reusable `wasmtime::Module`. Lookup is lock-free-read via
//! `dashmap`; concurrent misses for the *same* key converge on a single
//! compilation through a `tokio::sync::OnceCell` per key, generalizing
//! the teacher's `RwLock<HashMap<[u8; 32], Component>>` cache in
//! `vm/wasm/src/lib.rs` from "lock the whole map to insert" to
//! "lock-free read, at-most-one-compile-per-miss."
//!
//! Compilation failure is deliberately *not* cached: `OnceCell::
//! get_or_try_init` leaves the cell uninitialized on error, so a
//! transient compile failure doesn't poison the key for later callers.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::instrument;
use viewd_telemetry::metrics;
use viewd_types::{ContractId, RevisionHash, ViewError};
use wasmtime::{Engine, Module};

type CacheKey = (ContractId, RevisionHash);
type Slot = Arc<OnceCell<Module>>;

/// A dedicated, fixed-size pool of OS threads that does nothing but run
/// `wasmtime::Module::new` (spec §5: "MAY offload [compilation] to a
/// dedicated compile thread"). Sized by `EngineConfig::compile_threads`
/// so compilation load is bounded independent of Tokio's own blocking
/// pool, the way the worker pool (spec §4.4) bounds guest execution.
struct CompilePool {
    sender: crossbeam_channel::Sender<CompileJob>,
}

struct CompileJob {
    engine: Engine,
    code: Vec<u8>,
    reply: tokio::sync::oneshot::Sender<Result<Module, String>>,
}

impl CompilePool {
    fn new(threads: usize) -> Result<Self, ViewError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<CompileJob>();
        for index in 0..threads.max(1) {
            let receiver = receiver.clone();
            let name = format!("viewd-compile-{index}");
            std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        let result = Module::new(&job.engine, &job.code).map_err(|e| e.to_string());
                        let _ = job.reply.send(result);
                    }
                })
                .map_err(|e| ViewError::CodeCompilation(format!("failed to spawn {name}: {e}")))?;
        }
        Ok(Self { sender })
    }

    async fn compile(&self, engine: Engine, code: Vec<u8>) -> Result<Module, ViewError> {
        let (reply, reply_rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(CompileJob {
                engine,
                code,
                reply,
            })
            .map_err(|_| ViewError::CodeCompilation("compile pool has shut down".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ViewError::CodeCompilation("compile worker terminated without a reply".to_string()))?
            .map_err(ViewError::CodeCompilation)
    }
}

/// An unbounded compiled-module cache, retained for the process
/// lifetime (spec §4.3's default; see [`BoundedModuleCache`] for the
/// optional eviction variant).
pub struct ModuleCache {
    engine: Engine,
    entries: DashMap<CacheKey, Slot>,
    compile_pool: CompilePool,
}

impl ModuleCache {
    /// `compile_threads` sizes the dedicated compile-thread pool (spec
    /// §5 / `EngineConfig::compile_threads`); it is independent of the
    /// worker pool that runs guest code.
    pub fn new(engine: Engine, compile_threads: usize) -> Result<Self, ViewError> {
        Ok(Self {
            engine,
            entries: DashMap::new(),
            compile_pool: CompilePool::new(compile_threads)?,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Returns the compiled module for `(contract, revision)`, compiling
    /// it via `fetch_code` on first access. Concurrent callers racing
    /// on the same key share one compilation; callers on different keys
    /// never block each other.
    #[instrument(skip(self, fetch_code))]
    pub async fn get_or_compile<F, Fut>(
        &self,
        contract: &ContractId,
        revision: &RevisionHash,
        fetch_code: F,
    ) -> Result<Module, ViewError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, ViewError>>,
    {
        let key = (contract.clone(), revision.clone());
        let (slot, _was_present) = self.ensure_slot(key);
        self.compile_slot(&slot, fetch_code).await
    }

    /// Atomically fetches the `(contract, revision)` slot, creating it
    /// if absent. `entries.entry()` holds the shard's write lock for
    /// the duration of the Vacant/Occupied decision, so of two callers
    /// racing on the same brand-new key, exactly one observes `Vacant`
    /// (`was_present = false`) and the other observes the slot it just
    /// inserted (`was_present = true`) — never both `false`.
    fn ensure_slot(&self, key: CacheKey) -> (Slot, bool) {
        match self.entries.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(e) => (e.get().clone(), true),
            dashmap::mapref::entry::Entry::Vacant(e) => {
                let slot = Arc::new(OnceCell::new());
                e.insert(slot.clone());
                (slot, false)
            }
        }
    }

    /// Drives compilation for an already-resolved `slot`, recording a
    /// cache hit/miss depending on whether it was compiled before this
    /// call reached it.
    async fn compile_slot<F, Fut>(&self, slot: &Slot, fetch_code: F) -> Result<Module, ViewError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, ViewError>>,
    {
        let was_initialized = slot.initialized();
        let module = slot
            .get_or_try_init(|| async {
                let code = fetch_code().await?;
                self.compile_pool.compile(self.engine.clone(), code).await
            })
            .await?;

        if was_initialized {
            metrics().inc_cache_hit();
        } else {
            metrics().inc_cache_miss();
        }
        Ok(module.clone())
    }

    /// Number of distinct `(contract, revision)` keys currently tracked,
    /// including in-flight compilations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A size-bounded variant of [`ModuleCache`] with true LRU eviction:
/// every access (hit or miss) moves its key to the most-recently-used
/// end of `order`, and a miss that pushes the cache over `capacity`
/// evicts from the least-recently-used end. Eviction is safe at any
/// time because recompiling an evicted key is always correct, just not
/// free (spec §4.3 leaves the eviction policy itself unobserved by
/// callers).
pub struct BoundedModuleCache {
    inner: ModuleCache,
    capacity: usize,
    order: Mutex<VecDeque<CacheKey>>,
}

impl BoundedModuleCache {
    pub fn new(engine: Engine, capacity: usize, compile_threads: usize) -> Result<Self, ViewError> {
        Ok(Self {
            inner: ModuleCache::new(engine, compile_threads)?,
            capacity: capacity.max(1),
            order: Mutex::new(VecDeque::new()),
        })
    }

    #[instrument(skip(self, fetch_code))]
    pub async fn get_or_compile<F, Fut>(
        &self,
        contract: &ContractId,
        revision: &RevisionHash,
        fetch_code: F,
    ) -> Result<Module, ViewError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, ViewError>>,
    {
        let key = (contract.clone(), revision.clone());

        // `ensure_slot` (the entries-map mutation) runs *while* `order` is
        // held, so the presence decision and the order-deque bookkeeping
        // are one atomic step: two callers racing on the same brand-new
        // key can no longer both observe "I was first" and both
        // `push_back`, the duplicate that broke the LRU invariant.
        let (slot, was_present) = {
            let mut order = self.order.lock();
            let (slot, was_present) = self.inner.ensure_slot(key.clone());
            if was_present {
                if let Some(pos) = order.iter().position(|existing| existing == &key) {
                    order.remove(pos);
                }
            }
            order.push_back(key.clone());
            (slot, was_present)
        };

        let module = self.inner.compile_slot(&slot, fetch_code).await?;

        if !was_present {
            let mut order = self.order.lock();
            while self.inner.entries.len() > self.capacity {
                match order.pop_front() {
                    Some(evict_key) => {
                        self.inner.entries.remove(&evict_key);
                    }
                    None => break,
                }
            }
        }

        Ok(module)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_engine() -> Engine {
        Engine::default()
    }

    // A minimal, valid empty wasm module: `(module)`.
    const TRIVIAL_WASM: &[u8] = &[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];

    #[tokio::test]
    async fn concurrent_misses_on_same_key_compile_once() {
        let cache = Arc::new(ModuleCache::new(test_engine(), 1).unwrap());
        let compiles = Arc::new(AtomicUsize::new(0));
        let contract = ContractId::from("alice.near");
        let revision = RevisionHash(vec![1, 2, 3]);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let compiles = compiles.clone();
            let contract = contract.clone();
            let revision = revision.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compile(&contract, &revision, || async {
                        compiles.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok(TRIVIAL_WASM.to_vec())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(compiles.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn different_keys_proceed_independently() {
        let cache = ModuleCache::new(test_engine(), 2).unwrap();
        let a = cache
            .get_or_compile(&ContractId::from("a.near"), &RevisionHash(vec![1]), || async {
                Ok(TRIVIAL_WASM.to_vec())
            })
            .await;
        let b = cache
            .get_or_compile(&ContractId::from("b.near"), &RevisionHash(vec![1]), || async {
                Ok(TRIVIAL_WASM.to_vec())
            })
            .await;
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn compilation_failure_is_not_cached() {
        let cache = ModuleCache::new(test_engine(), 1).unwrap();
        let contract = ContractId::from("alice.near");
        let revision = RevisionHash(vec![9]);

        let first = cache
            .get_or_compile(&contract, &revision, || async { Ok(vec![0xff, 0xff]) })
            .await;
        assert!(matches!(first, Err(ViewError::CodeCompilation(_))));

        let second = cache
            .get_or_compile(&contract, &revision, || async { Ok(TRIVIAL_WASM.to_vec()) })
            .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn bounded_cache_evicts_oldest_entry() {
        let cache = BoundedModuleCache::new(test_engine(), 2, 1).unwrap();
        for i in 0..3u8 {
            cache
                .get_or_compile(
                    &ContractId::from(format!("c{i}.near").as_str()),
                    &RevisionHash(vec![i]),
                    || async { Ok(TRIVIAL_WASM.to_vec()) },
                )
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn a_recent_hit_survives_eviction_over_an_older_one() {
        let cache = BoundedModuleCache::new(test_engine(), 2, 1).unwrap();
        let a = (ContractId::from("a.near"), RevisionHash(vec![0]));
        let b = (ContractId::from("b.near"), RevisionHash(vec![1]));
        let c = (ContractId::from("c.near"), RevisionHash(vec![2]));

        cache
            .get_or_compile(&a.0, &a.1, || async { Ok(TRIVIAL_WASM.to_vec()) })
            .await
            .unwrap();
        cache
            .get_or_compile(&b.0, &b.1, || async { Ok(TRIVIAL_WASM.to_vec()) })
            .await
            .unwrap();

        // Touch `a` again so it becomes the most-recently-used entry;
        // a plain FIFO cache would still evict it next since it was the
        // first one inserted.
        cache
            .get_or_compile(&a.0, &a.1, || async { Ok(TRIVIAL_WASM.to_vec()) })
            .await
            .unwrap();

        // Inserting `c` pushes the cache over capacity 2; the least
        // recently used entry is `b`, not `a`.
        let mut compiled_b_again = false;
        cache
            .get_or_compile(&c.0, &c.1, || async { Ok(TRIVIAL_WASM.to_vec()) })
            .await
            .unwrap();
        cache
            .get_or_compile(&b.0, &b.1, || async {
                compiled_b_again = true;
                Ok(TRIVIAL_WASM.to_vec())
            })
            .await
            .unwrap();
        assert!(compiled_b_again, "b should have been evicted, not a");

        let mut compiled_a_again = false;
        cache
            .get_or_compile(&a.0, &a.1, || async {
                compiled_a_again = true;
                Ok(TRIVIAL_WASM.to_vec())
            })
            .await
            .unwrap();
        assert!(!compiled_a_again, "a was recently used and should still be cached");
    }

    #[tokio::test]
    async fn concurrent_misses_on_same_key_leave_a_single_order_entry() {
        // Regression test: a naive "contains_key, then insert later" check
        // lets two callers racing on the same brand-new key both conclude
        // they were first, leaving a stray duplicate in `order` that
        // survives eviction forever.
        let cache = Arc::new(BoundedModuleCache::new(test_engine(), 8, 2).unwrap());
        let contract = ContractId::from("alice.near");
        let revision = RevisionHash(vec![7]);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let contract = contract.clone();
            let revision = revision.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compile(&contract, &revision, || async {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Ok(TRIVIAL_WASM.to_vec())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.order.lock().len(), 1);
    }
}
