// Path: crates/store/src/redis_store.rs
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{StorageError, VersionedStore};

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    20
}

/// Connection parameters for [`RedisStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// A `redis://` or `rediss://` connection URL.
    pub url: String,
    /// Upper bound on attempts for a single store call before a
    /// transient error propagates (spec §7: "bounded retry" for
    /// `transient` failures only; every other error surfaces
    /// immediately, no retry attempted).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for the retry backoff; doubled on each subsequent
    /// attempt (attempt 1 waits `base`, attempt 2 waits `2*base`, ...).
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

/// Retries `op` while it keeps failing with [`StorageError::Unavailable`]
/// (spec §7's `transient`, "safe to retry"), up to `max_attempts` total
/// tries, backing off `base_delay * 2^attempt` between them.
/// [`StorageError::Protocol`] is not safe to retry blindly and surfaces
/// on the first occurrence.
async fn with_retry<T, F, Fut>(
    op_name: &'static str,
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(StorageError::Unavailable(msg)) if attempt + 1 < max_attempts.max(1) => {
                let delay = base_delay * 2u32.pow(attempt);
                warn!(op = op_name, attempt, %msg, ?delay, "retrying transient store error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// A [`VersionedStore`] backed by a Redis-compatible server.
///
/// Ordered sets back `revrange_le`: the caller is expected to maintain,
/// per `set_key`, members scored by the height at which they were
/// written, so that `ZREVRANGEBYSCORE key max_score -inf LIMIT 0 1`
/// yields the value visible at that height. Plain keys back `get`.
/// `scan` delegates directly to Redis's cursor-based `SCAN`.
pub struct RedisStore {
    conn: ConnectionManager,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl RedisStore {
    /// Establishes a connection manager, which transparently reconnects
    /// on transport failure (the teacher's own storage clients lean on
    /// the same "managed connection" pattern rather than hand-rolled
    /// retry loops). Per-call bounded retry for transient failures
    /// still lives here (spec §7), since the connection manager's
    /// reconnect happens in the background and does not itself retry
    /// the in-flight command.
    pub async fn connect(config: &RedisStoreConfig) -> Result<Self, StorageError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StorageError::Protocol(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(StorageError::from)?;
        Ok(Self {
            conn,
            max_attempts: config.max_attempts,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }
}

#[async_trait]
impl VersionedStore for RedisStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        debug!(key = %String::from_utf8_lossy(key), "store get");
        with_retry("get", self.max_attempts, self.retry_base_delay, || async {
            let mut conn = self.conn.clone();
            let value: Option<Vec<u8>> = conn.get(key).await.map_err(StorageError::from)?;
            Ok(value)
        })
        .await
    }

    async fn revrange_le(
        &self,
        set_key: &[u8],
        max_score: u64,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        debug!(
            set_key = %String::from_utf8_lossy(set_key),
            max_score,
            "store revrange_le"
        );
        with_retry(
            "revrange_le",
            self.max_attempts,
            self.retry_base_delay,
            || async {
                let mut conn = self.conn.clone();
                let members: Vec<Vec<u8>> = redis::cmd("ZREVRANGEBYSCORE")
                    .arg(set_key)
                    .arg(max_score)
                    .arg("-inf")
                    .arg("LIMIT")
                    .arg(0)
                    .arg(1)
                    .query_async(&mut conn)
                    .await
                    .map_err(StorageError::from)?;
                Ok(members.into_iter().next())
            },
        )
        .await
    }

    async fn scan(
        &self,
        cursor: &str,
        match_pattern: &[u8],
        count_hint: usize,
    ) -> Result<(String, Vec<Vec<u8>>), StorageError> {
        debug!(
            cursor,
            pattern = %String::from_utf8_lossy(match_pattern),
            count_hint,
            "store scan"
        );
        with_retry("scan", self.max_attempts, self.retry_base_delay, || async {
            let mut conn = self.conn.clone();
            let (next_cursor, keys): (String, Vec<Vec<u8>>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(match_pattern)
                .arg("COUNT")
                .arg(count_hint)
                .query_async(&mut conn)
                .await
                .map_err(StorageError::from)?;
            Ok((next_cursor, keys))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let attempts = AtomicU32::new(0);
        let result: Result<&'static str, StorageError> = with_retry(
            "test",
            3,
            Duration::from_millis(1),
            || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StorageError::Unavailable("connection reset".to_string()))
                } else {
                    Ok("ok")
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), StorageError> = with_retry(
            "test",
            3,
            Duration::from_millis(1),
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::Unavailable("still down".to_string()))
            },
        )
        .await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn protocol_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), StorageError> = with_retry(
            "test",
            3,
            Duration::from_millis(1),
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::Protocol("malformed reply".to_string()))
            },
        )
        .await;
        assert!(matches!(result, Err(StorageError::Protocol(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
