// Path: crates/resolver/src/lib.rs
#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

//! The State Resolver (spec §4.2): composes the Versioned Store
//! Client's three primitives into domain-level queries — latest
//! height, and revision/blob lookups for code, account, and storage
//! data — each resolved against a pinned block height.

mod keyspace;
mod request_cache;

pub use request_cache::{BlobKind, RequestCache, RevisionKind};

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, instrument};
use viewd_store::VersionedStore;
use viewd_types::{ContractId, Height, RevisionHash, ViewError};

/// One fetched storage entry from [`StateResolver::scan_data_keys`]:
/// the contract-chosen key with its value resolved at the scan's
/// pinned height (`None` if no revision of that key exists at or
/// before that height).
pub struct ScannedEntry {
    pub storage_key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

struct LatestHeightCache {
    ttl: Duration,
    slot: RwLock<Option<(Height, Instant)>>,
}

impl LatestHeightCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    fn fresh(&self) -> Option<Height> {
        let slot = self.slot.read();
        match *slot {
            Some((height, fetched_at)) if fetched_at.elapsed() < self.ttl => Some(height),
            _ => None,
        }
    }

    fn store(&self, height: Height) {
        *self.slot.write() = Some((height, Instant::now()));
    }
}

/// Composes [`VersionedStore`] primitives into height-indexed domain
/// queries. Cheap to clone (an `Arc` handle internally); shared across
/// all in-flight view calls.
#[derive(Clone)]
pub struct StateResolver {
    store: Arc<dyn VersionedStore>,
    latest_height: Arc<LatestHeightCache>,
}

impl StateResolver {
    pub fn new(store: Arc<dyn VersionedStore>, latest_height_ttl: Duration) -> Self {
        Self {
            store,
            latest_height: Arc::new(LatestHeightCache::new(latest_height_ttl)),
        }
    }

    /// The latest indexed block height, served from a short-TTL cache
    /// (spec §4.2: freshness matters more than stability here).
    #[instrument(skip(self))]
    pub async fn latest_height(&self) -> Result<Height, ViewError> {
        if let Some(height) = self.latest_height.fresh() {
            return Ok(height);
        }
        let bytes = self
            .store
            .get(keyspace::LATEST_BLOCK_HEIGHT)
            .await?
            .ok_or_else(|| ViewError::Transient("latest_block_height is unset".to_string()))?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| ViewError::Transient(format!("latest_block_height not utf-8: {e}")))?;
        let value: u64 = text
            .trim()
            .parse()
            .map_err(|e| ViewError::Transient(format!("latest_block_height malformed: {e}")))?;
        let height = Height(value);
        self.latest_height.store(height);
        Ok(height)
    }

    /// Opens a request-scoped session for one `view()` call, pinned to
    /// `height`, backed by a fresh [`RequestCache`].
    pub fn session(&self, height: Height) -> ResolverSession {
        ResolverSession {
            resolver: self.clone(),
            height,
            cache: RequestCache::new(),
        }
    }

    async fn code_revision_uncached(
        &self,
        contract: &ContractId,
        height: Height,
    ) -> Result<Option<RevisionHash>, ViewError> {
        let set_key = keyspace::code_set_key(contract.as_bytes());
        let member = self.store.revrange_le(&set_key, height.0).await?;
        Ok(member.map(RevisionHash))
    }

    async fn code_blob_uncached(
        &self,
        contract: &ContractId,
        revision: &RevisionHash,
    ) -> Result<Option<Vec<u8>>, ViewError> {
        let key = keyspace::code_blob_key(contract.as_bytes(), revision.as_bytes());
        Ok(self.store.get(&key).await?)
    }

    async fn account_revision_uncached(
        &self,
        contract: &ContractId,
        height: Height,
    ) -> Result<Option<RevisionHash>, ViewError> {
        let set_key = keyspace::account_set_key(contract.as_bytes());
        let member = self.store.revrange_le(&set_key, height.0).await?;
        Ok(member.map(RevisionHash))
    }

    async fn account_blob_uncached(
        &self,
        contract: &ContractId,
        revision: &RevisionHash,
    ) -> Result<Option<Vec<u8>>, ViewError> {
        let key = keyspace::account_blob_key(contract.as_bytes(), revision.as_bytes());
        Ok(self.store.get(&key).await?)
    }

    async fn data_revision_uncached(
        &self,
        composite_key: &[u8],
        height: Height,
    ) -> Result<Option<RevisionHash>, ViewError> {
        let set_key = keyspace::data_set_key(composite_key);
        let member = self.store.revrange_le(&set_key, height.0).await?;
        Ok(member.map(RevisionHash))
    }

    async fn data_blob_uncached(
        &self,
        composite_key: &[u8],
        revision: &RevisionHash,
    ) -> Result<Option<Vec<u8>>, ViewError> {
        let key = keyspace::data_blob_key(composite_key, revision.as_bytes());
        Ok(self.store.get(&key).await?)
    }
}

/// A resolver handle scoped to a single `view()` call, pinned to one
/// height and backed by a request-scoped cache (spec §4.2).
pub struct ResolverSession {
    resolver: StateResolver,
    height: Height,
    cache: RequestCache,
}

impl ResolverSession {
    pub fn height(&self) -> Height {
        self.height
    }

    #[instrument(skip(self))]
    pub async fn code_revision(&self, contract: &ContractId) -> Result<Option<RevisionHash>, ViewError> {
        let key = contract.as_bytes();
        if let Some(cached) = self.cache.get_revision(RevisionKind::Code, key, self.height) {
            return Ok(cached);
        }
        let value = self.resolver.code_revision_uncached(contract, self.height).await?;
        self.cache.put_revision(RevisionKind::Code, key, self.height, value.clone());
        Ok(value)
    }

    #[instrument(skip(self))]
    pub async fn code_blob(
        &self,
        contract: &ContractId,
        revision: &RevisionHash,
    ) -> Result<Option<Vec<u8>>, ViewError> {
        let key = keyspace::code_blob_key(contract.as_bytes(), revision.as_bytes());
        if let Some(cached) = self.cache.get_blob(BlobKind::Code, &key, self.height) {
            return Ok(cached);
        }
        let value = self.resolver.code_blob_uncached(contract, revision).await?;
        self.cache.put_blob(BlobKind::Code, &key, self.height, value.clone());
        Ok(value)
    }

    #[instrument(skip(self))]
    pub async fn account_revision(&self, contract: &ContractId) -> Result<Option<RevisionHash>, ViewError> {
        let key = contract.as_bytes();
        if let Some(cached) = self.cache.get_revision(RevisionKind::Account, key, self.height) {
            return Ok(cached);
        }
        let value = self.resolver.account_revision_uncached(contract, self.height).await?;
        self.cache.put_revision(RevisionKind::Account, key, self.height, value.clone());
        Ok(value)
    }

    #[instrument(skip(self))]
    pub async fn account_blob(
        &self,
        contract: &ContractId,
        revision: &RevisionHash,
    ) -> Result<Option<Vec<u8>>, ViewError> {
        let key = keyspace::account_blob_key(contract.as_bytes(), revision.as_bytes());
        if let Some(cached) = self.cache.get_blob(BlobKind::Account, &key, self.height) {
            return Ok(cached);
        }
        let value = self.resolver.account_blob_uncached(contract, revision).await?;
        self.cache.put_blob(BlobKind::Account, &key, self.height, value.clone());
        Ok(value)
    }

    /// `composite_key` is `{C}:{contract-chosen key}` (see
    /// [`keyspace::composite_key`]).
    #[instrument(skip(self, composite_key))]
    pub async fn data_revision(&self, composite_key: &[u8]) -> Result<Option<RevisionHash>, ViewError> {
        if let Some(cached) = self.cache.get_revision(RevisionKind::Data, composite_key, self.height) {
            return Ok(cached);
        }
        let value = self
            .resolver
            .data_revision_uncached(composite_key, self.height)
            .await?;
        self.cache
            .put_revision(RevisionKind::Data, composite_key, self.height, value.clone());
        Ok(value)
    }

    #[instrument(skip(self, composite_key))]
    pub async fn data_blob(
        &self,
        composite_key: &[u8],
        revision: &RevisionHash,
    ) -> Result<Option<Vec<u8>>, ViewError> {
        let key = keyspace::data_blob_key(composite_key, revision.as_bytes());
        if let Some(cached) = self.cache.get_blob(BlobKind::Data, &key, self.height) {
            return Ok(cached);
        }
        let value = self.resolver.data_blob_uncached(composite_key, revision).await?;
        self.cache.put_blob(BlobKind::Data, &key, self.height, value.clone());
        Ok(value)
    }

    /// Resolves `(C, storage_key)`'s value as of this session's pinned
    /// height, or `None` if no revision exists at or before it. This is
    /// what `storage_read`/`storage_has_key` in the Host Bridge call.
    pub async fn resolve_storage_value(
        &self,
        contract: &ContractId,
        storage_key: &[u8],
    ) -> Result<Option<Vec<u8>>, ViewError> {
        let composite = keyspace::composite_key(contract.as_bytes(), storage_key);
        let Some(revision) = self.data_revision(&composite).await? else {
            return Ok(None);
        };
        self.data_blob(&composite, &revision).await
    }

    /// Cursor-driven scan over one contract's storage keys matching
    /// `pattern`, with each key's value resolved at this session's
    /// pinned height (spec §4.2). `pattern` is matched the same way the
    /// store's own `scan` matches (a `*`-suffixed literal prefix).
    #[instrument(skip(self, pattern))]
    pub async fn scan_data_keys(
        &self,
        contract: &ContractId,
        pattern: &[u8],
        cursor: &str,
        limit: usize,
    ) -> Result<(String, Vec<ScannedEntry>), ViewError> {
        let mut match_pattern = keyspace::data_scan_prefix(contract.as_bytes());
        match_pattern.extend_from_slice(pattern);
        match_pattern.push(b'*');

        let (next_cursor, raw_keys) = self
            .resolver
            .store
            .scan(cursor, &match_pattern, limit)
            .await?;

        let mut entries = Vec::with_capacity(raw_keys.len());
        for full_key in raw_keys {
            let Some(storage_key) = keyspace::strip_data_prefix(&full_key, contract.as_bytes()) else {
                debug!(?full_key, "scan returned key outside contract prefix, skipping");
                continue;
            };
            let value = self.resolve_storage_value(contract, storage_key).await?;
            entries.push(ScannedEntry {
                storage_key: storage_key.to_vec(),
                value,
            });
        }
        Ok((next_cursor, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewd_store::testing::MemoryStore;

    fn contract(name: &str) -> ContractId {
        ContractId::from(name)
    }

    #[tokio::test]
    async fn code_revision_picks_greatest_score_not_exceeding_height() {
        let store = Arc::new(MemoryStore::new());
        store.put_versioned(b"code:alice.near".to_vec(), 50, b"r50".to_vec());
        store.put_versioned(b"code:alice.near".to_vec(), 90, b"r90".to_vec());
        let resolver = StateResolver::new(store, Duration::from_millis(200));
        let session = resolver.session(Height(100));

        let revision = session.code_revision(&contract("alice.near")).await.unwrap();
        assert_eq!(revision, Some(RevisionHash(b"r90".to_vec())));

        let session_early = resolver.session(Height(60));
        let revision_early = session_early.code_revision(&contract("alice.near")).await.unwrap();
        assert_eq!(revision_early, Some(RevisionHash(b"r50".to_vec())));
    }

    #[tokio::test]
    async fn code_revision_is_none_below_earliest_revision() {
        let store = Arc::new(MemoryStore::new());
        store.put_versioned(b"code:alice.near".to_vec(), 50, b"r50".to_vec());
        let resolver = StateResolver::new(store, Duration::from_millis(200));
        let session = resolver.session(Height(10));
        assert_eq!(session.code_revision(&contract("alice.near")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn latest_height_parses_ascii_decimal() {
        let store = Arc::new(MemoryStore::new());
        store.put(b"latest_block_height".to_vec(), b"12345".to_vec());
        let resolver = StateResolver::new(store, Duration::from_millis(200));
        assert_eq!(resolver.latest_height().await.unwrap(), Height(12345));
    }

    #[tokio::test]
    async fn resolve_storage_value_resolves_through_composite_key() {
        let store = Arc::new(MemoryStore::new());
        store.put_versioned(b"data:alice.near:k".to_vec(), 40, b"r1".to_vec());
        store.put(b"data-value:alice.near:k:r1".to_vec(), b"v".to_vec());
        let resolver = StateResolver::new(store, Duration::from_millis(200));
        let session = resolver.session(Height(100));

        let value = session
            .resolve_storage_value(&contract("alice.near"), b"k")
            .await
            .unwrap();
        assert_eq!(value, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn resolve_storage_value_reflects_pinned_height_not_later_writes() {
        let store = Arc::new(MemoryStore::new());
        store.put_versioned(b"data:alice.near:k".to_vec(), 40, b"r1".to_vec());
        store.put(b"data-value:alice.near:k:r1".to_vec(), b"v1".to_vec());
        let resolver = StateResolver::new(store, Duration::from_millis(200));
        let session = resolver.session(Height(100));

        // A later revision lands after the session is pinned.
        store.put_versioned(b"data:alice.near:k".to_vec(), 101, b"r2".to_vec());
        store.put(b"data-value:alice.near:k:r2".to_vec(), b"v2".to_vec());

        let value = session
            .resolve_storage_value(&contract("alice.near"), b"k")
            .await
            .unwrap();
        assert_eq!(value, Some(b"v1".to_vec()));
    }
}
