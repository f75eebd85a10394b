// Path: crates/store/src/error.rs
use viewd_types::ViewError;

/// Errors surfaced by a [`crate::VersionedStore`] implementation.
///
/// This is deliberately narrower than [`ViewError`]: the store layer has
/// no notion of accounts, contracts, or methods, so every failure it can
/// report collapses onto `ViewError::Transient` once it crosses into
/// `viewd-resolver`. Keeping a separate type here lets callers match on
/// `Unavailable` vs `Protocol` without reaching into the domain error
/// taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing service could not be reached, or the connection was
    /// reset mid-request. Safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backing service replied, but with a response this client
    /// cannot interpret (wrong type, malformed reply). Not safe to
    /// retry blindly.
    #[error("store protocol error: {0}")]
    Protocol(String),
}

impl From<StorageError> for ViewError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(msg) => ViewError::Transient(msg),
            StorageError::Protocol(msg) => ViewError::Transient(msg),
        }
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            StorageError::Unavailable(err.to_string())
        } else {
            StorageError::Protocol(err.to_string())
        }
    }
}
