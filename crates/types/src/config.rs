// Path: crates/types/src/config.rs
//! Shared configuration structures for the resolver, cache, pool, and
//! engine. Loading these from a file, environment, or CLI flags is an
//! external collaborator's job (spec §1); this crate only owns the
//! shape and the defaults, the way `ioi_types::config::VmFuelCosts`
//! owns its shape independent of whoever parses it off disk.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_pool_size() -> usize {
    10
}
fn default_call_deadline_ms() -> u64 {
    5_000
}
fn default_height_ttl_ms() -> u64 {
    200
}
fn default_max_memory_pages() -> u32 {
    // 256 pages * 64 KiB = 16 MiB of guest linear memory.
    256
}
fn default_compile_threads() -> usize {
    2
}

/// Top-level configuration for a `ViewEngine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed worker pool capacity (spec §4.4 default: 10).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Total deadline for a single view call, shared across store
    /// lookups and guest invocation (spec §5 "Timeouts").
    #[serde(default = "default_call_deadline_ms")]
    pub call_deadline_ms: u64,
    /// Bounded TTL for the process-wide `latest_block_height` memo
    /// (spec §4.2; "on the order of hundreds of milliseconds").
    #[serde(default = "default_height_ttl_ms")]
    pub latest_height_ttl_ms: u64,
    /// Guest linear-memory ceiling, in 64 KiB wasm pages.
    #[serde(default = "default_max_memory_pages")]
    pub max_memory_pages: u32,
    /// Number of dedicated threads available to offload module
    /// compilation so it never stalls the coordinator loop (spec §5).
    #[serde(default = "default_compile_threads")]
    pub compile_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            call_deadline_ms: default_call_deadline_ms(),
            latest_height_ttl_ms: default_height_ttl_ms(),
            max_memory_pages: default_max_memory_pages(),
            compile_threads: default_compile_threads(),
        }
    }
}

impl EngineConfig {
    pub fn call_deadline(&self) -> Duration {
        Duration::from_millis(self.call_deadline_ms)
    }

    pub fn latest_height_ttl(&self) -> Duration {
        Duration::from_millis(self.latest_height_ttl_ms)
    }
}
