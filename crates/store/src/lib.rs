// Path: crates/store/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! The Versioned Store Client (spec §4.1).
//!
//! A thin contract over an external ordered key-value service. This
//! crate knows nothing about contracts, heights, or revisions as
//! domain concepts — it only exposes three primitive queries
//! (`get`, `revrange_le`, `scan`) over raw bytes; `viewd-resolver`
//! composes them into the domain-level operations spec §4.2 describes.

mod error;
mod redis_store;
pub mod testing;

pub use error::StorageError;
pub use redis_store::{RedisStore, RedisStoreConfig};

use async_trait::async_trait;

/// The three primitive operations an external ordered key-value service
/// must provide (spec §4.1).
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Exact fetch by key. Keys may be arbitrary byte strings.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Returns the single member of the ordered set `set_key` with the
    /// greatest score not exceeding `max_score`, or `None` if no such
    /// member exists.
    async fn revrange_le(
        &self,
        set_key: &[u8],
        max_score: u64,
    ) -> Result<Option<Vec<u8>>, StorageError>;

    /// Cooperative cursor-based key scan. `cursor == "0"` starts a scan;
    /// the returned cursor is `"0"` once the scan completes.
    async fn scan(
        &self,
        cursor: &str,
        match_pattern: &[u8],
        count_hint: usize,
    ) -> Result<(String, Vec<Vec<u8>>), StorageError>;
}

#[async_trait]
impl<T: VersionedStore + ?Sized> VersionedStore for std::sync::Arc<T> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key).await
    }

    async fn revrange_le(
        &self,
        set_key: &[u8],
        max_score: u64,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).revrange_le(set_key, max_score).await
    }

    async fn scan(
        &self,
        cursor: &str,
        match_pattern: &[u8],
        count_hint: usize,
    ) -> Result<(String, Vec<Vec<u8>>), StorageError> {
        (**self).scan(cursor, match_pattern, count_hint).await
    }
}
