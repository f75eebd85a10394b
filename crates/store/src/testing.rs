// Path: crates/store/src/testing.rs
//! An in-process [`VersionedStore`] double, for exercising
//! `viewd-resolver` and `viewd-engine` without a live Redis instance.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{StorageError, VersionedStore};

/// A `BTreeMap`-backed store. Ordered sets are modeled as a
/// `BTreeMap<score, value>` per `set_key`, which makes `revrange_le` a
/// single `range(..=max_score).next_back()` lookup — the in-memory
/// analogue of `ZREVRANGEBYSCORE ... LIMIT 0 1`.
#[derive(Default)]
pub struct MemoryStore {
    plain: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    ordered: Mutex<BTreeMap<Vec<u8>, BTreeMap<u64, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a plain key, as used by `get`.
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.plain.lock().insert(key.into(), value.into());
    }

    /// Inserts a scored member into the ordered set `set_key`, as used
    /// by `revrange_le`.
    pub fn put_versioned(&self, set_key: impl Into<Vec<u8>>, score: u64, value: impl Into<Vec<u8>>) {
        self.ordered
            .lock()
            .entry(set_key.into())
            .or_default()
            .insert(score, value.into());
    }
}

#[async_trait]
impl VersionedStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.plain.lock().get(key).cloned())
    }

    async fn revrange_le(
        &self,
        set_key: &[u8],
        max_score: u64,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let ordered = self.ordered.lock();
        Ok(ordered
            .get(set_key)
            .and_then(|members| members.range(..=max_score).next_back())
            .map(|(_, value)| value.clone()))
    }

    async fn scan(
        &self,
        cursor: &str,
        match_pattern: &[u8],
        count_hint: usize,
    ) -> Result<(String, Vec<Vec<u8>>), StorageError> {
        // Matches only a fixed literal prefix followed by `*`, which is
        // all `viewd-resolver` ever asks of `scan`.
        let prefix: Vec<u8> = match_pattern.strip_suffix(b"*") {
            Some(p) => p.to_vec(),
            None => match_pattern.to_vec(),
        };
        let start: usize = cursor.parse().unwrap_or(0);
        let plain = self.plain.lock();
        let matching: Vec<&Vec<u8>> = plain
            .keys()
            .filter(|k| k.starts_with(prefix.as_slice()))
            .collect();
        let page: Vec<Vec<u8>> = matching
            .iter()
            .skip(start)
            .take(count_hint.max(1))
            .map(|k| (**k).clone())
            .collect();
        let consumed = start + page.len();
        let next_cursor = if consumed >= matching.len() {
            "0".to_string()
        } else {
            consumed.to_string()
        };
        Ok((next_cursor, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revrange_le_picks_greatest_score_not_exceeding_max() {
        let store = MemoryStore::new();
        store.put_versioned(b"acct:alice".to_vec(), 10, b"v10".to_vec());
        store.put_versioned(b"acct:alice".to_vec(), 20, b"v20".to_vec());
        store.put_versioned(b"acct:alice".to_vec(), 30, b"v30".to_vec());

        assert_eq!(
            store.revrange_le(b"acct:alice", 25).await.unwrap(),
            Some(b"v20".to_vec())
        );
        assert_eq!(
            store.revrange_le(b"acct:alice", 5).await.unwrap(),
            None
        );
        assert_eq!(
            store.revrange_le(b"acct:alice", 30).await.unwrap(),
            Some(b"v30".to_vec())
        );
    }

    #[tokio::test]
    async fn scan_paginates_until_cursor_is_zero() {
        let store = MemoryStore::new();
        for i in 0..5u8 {
            store.put(vec![b'k', i], vec![i]);
        }
        let mut cursor = "0".to_string();
        let mut seen = Vec::new();
        loop {
            let (next, keys) = store.scan(&cursor, b"k*", 2).await.unwrap();
            seen.extend(keys);
            if next == "0" {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn get_returns_none_for_missing_key() {
        let store = MemoryStore::new();
        assert_eq!(store.get(b"nope").await.unwrap(), None);
    }
}
