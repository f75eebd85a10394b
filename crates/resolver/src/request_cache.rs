// Path: crates/resolver/src/request_cache.rs
//! Request-scoped memoization (spec §4.2): one [`RequestCache`] lives
//! for the duration of a single `view()` call, so repeated lookups of
//! the same `(resource-kind, key, H)` during one call's execution do
//! not repeat store round trips. Negative lookups (no revision found)
//! are memoized too, since a guest method may probe several
//! speculative storage keys.
//!
//! A view call drives its worker's host-bridge calls one at a time —
//! there is never more than one resolver lookup in flight per call —
//! so a plain check-then-insert under a short-lived lock is enough;
//! no async-aware entry API is needed here.

use std::collections::HashMap;

use parking_lot::Mutex;
use viewd_types::{Height, RevisionHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    CodeRevision,
    CodeBlob,
    AccountRevision,
    AccountBlob,
    DataRevision,
    DataBlob,
}

#[derive(PartialEq, Eq, Hash)]
struct EntryKey {
    kind: Kind,
    key: Vec<u8>,
    height: Height,
}

#[derive(Clone)]
enum EntryValue {
    Revision(Option<RevisionHash>),
    Blob(Option<Vec<u8>>),
}

/// Caches resolver lookups within a single view call. One instance per
/// in-flight `view()`; never shared across calls.
#[derive(Default)]
pub struct RequestCache {
    entries: Mutex<HashMap<EntryKey, EntryValue>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, kind: Kind, key: &[u8], height: Height) -> Option<EntryValue> {
        let entry_key = EntryKey {
            kind,
            key: key.to_vec(),
            height,
        };
        self.entries.lock().get(&entry_key).cloned()
    }

    fn put(&self, kind: Kind, key: &[u8], height: Height, value: EntryValue) {
        let entry_key = EntryKey {
            kind,
            key: key.to_vec(),
            height,
        };
        self.entries.lock().insert(entry_key, value);
    }

    pub fn get_revision(&self, kind_key: RevisionKind, key: &[u8], height: Height) -> Option<Option<RevisionHash>> {
        match self.get(kind_key.into(), key, height)? {
            EntryValue::Revision(v) => Some(v),
            EntryValue::Blob(_) => None,
        }
    }

    pub fn put_revision(
        &self,
        kind_key: RevisionKind,
        key: &[u8],
        height: Height,
        value: Option<RevisionHash>,
    ) {
        self.put(kind_key.into(), key, height, EntryValue::Revision(value));
    }

    pub fn get_blob(&self, kind_key: BlobKind, key: &[u8], height: Height) -> Option<Option<Vec<u8>>> {
        match self.get(kind_key.into(), key, height)? {
            EntryValue::Blob(v) => Some(v),
            EntryValue::Revision(_) => None,
        }
    }

    pub fn put_blob(&self, kind_key: BlobKind, key: &[u8], height: Height, value: Option<Vec<u8>>) {
        self.put(kind_key.into(), key, height, EntryValue::Blob(value));
    }
}

/// Which revision family a `get_revision`/`put_revision` call concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevisionKind {
    Code,
    Account,
    Data,
}

/// Which blob family a `get_blob`/`put_blob` call concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    Code,
    Account,
    Data,
}

impl From<RevisionKind> for Kind {
    fn from(k: RevisionKind) -> Self {
        match k {
            RevisionKind::Code => Kind::CodeRevision,
            RevisionKind::Account => Kind::AccountRevision,
            RevisionKind::Data => Kind::DataRevision,
        }
    }
}

impl From<BlobKind> for Kind {
    fn from(k: BlobKind) -> Self {
        match k {
            BlobKind::Code => Kind::CodeBlob,
            BlobKind::Account => Kind::AccountBlob,
            BlobKind::Data => Kind::DataBlob,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memoizes_negative_lookups() {
        let cache = RequestCache::new();
        assert!(cache.get_revision(RevisionKind::Code, b"alice", Height(10)).is_none());
        cache.put_revision(RevisionKind::Code, b"alice", Height(10), None);
        assert_eq!(
            cache.get_revision(RevisionKind::Code, b"alice", Height(10)),
            Some(None)
        );
    }

    #[test]
    fn distinguishes_by_height() {
        let cache = RequestCache::new();
        cache.put_revision(
            RevisionKind::Code,
            b"alice",
            Height(10),
            Some(RevisionHash(vec![1])),
        );
        assert!(cache.get_revision(RevisionKind::Code, b"alice", Height(11)).is_none());
    }
}
