// Path: crates/types/src/ids.rs
//! Newtype identifiers for the resources the resolver addresses.
//!
//! Kept distinct rather than passed around as bare `u64`/`String`/`Vec<u8>`
//! so a call site cannot accidentally transpose a contract id and a
//! revision hash — the same discipline the teacher applies to `RootHash`
//! and `NodeHash` in its storage API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monotone, non-negative block height. A single view call pins exactly
/// one height for the duration of its execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Height(pub u64);

impl Height {
    pub const ZERO: Height = Height(0);
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Height {
    fn from(value: u64) -> Self {
        Height(value)
    }
}

/// An opaque UTF-8 contract identifier (account name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractId(pub String);

impl ContractId {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContractId {
    fn from(value: &str) -> Self {
        ContractId(value.to_string())
    }
}

impl From<String> for ContractId {
    fn from(value: String) -> Self {
        ContractId(value)
    }
}

/// An opaque, fixed-length content identifier naming an immutable payload
/// (a code blob, an account record, or a storage value) as it existed at
/// some block height.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionHash(pub Vec<u8>);

impl RevisionHash {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RevisionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}
