//! Cache Service
//!
//! Byte-oriented cache store trait and its Redis implementation.
//!
//! The store knows nothing about entities: values are opaque bytes, and
//! serialization happens in the cache-aside layer. Every operation can fail
//! with [`CacheError`]; callers decide whether a failure matters.
//!
//! # Example
//!
//! ```rust,ignore
//! use chat_hub::infrastructure::cache::{CacheStore, RedisCache};
//!
//! let cache = RedisCache::new(redis_connection);
//! cache.set("channel:7", bytes, Duration::from_secs(3600)).await?;
//! let cached = cache.get("channel:7").await?;
//! cache.delete_pattern("channel:7:messages*").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, instrument};

/// Keys deleted per SCAN round trip in `delete_pattern`.
const SCAN_BATCH: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Byte-oriented cache store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Retrieves raw bytes stored at `key`, `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `value` at `key` with the given time-to-live.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Deletes `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Deletes every key matching a glob `pattern` (`*` wildcard).
    /// Returns the number of keys removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;
}

/// Redis-backed cache store.
///
/// Uses a Redis ConnectionManager for connection reuse and automatic
/// reconnection handling.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    /// Optional key prefix for namespacing
    prefix: Option<Arc<str>>,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, prefix: None }
    }

    /// Creates a RedisCache whose keys are all prefixed.
    ///
    /// ```rust,ignore
    /// let cache = RedisCache::with_prefix(conn, "chat:v1:");
    /// // key "channel:7" becomes "chat:v1:channel:7"
    /// ```
    pub fn with_prefix(conn: ConnectionManager, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            conn,
            prefix: Some(prefix.into()),
        }
    }

    fn format_key(&self, key: &str) -> String {
        prefixed(self.prefix.as_deref(), key)
    }
}

fn prefixed(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}{}", prefix, key),
        None => key.to_string(),
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let result: Option<Vec<u8>> = conn.get(&full_key).await?;
        debug!(key = %full_key, hit = result.is_some(), "Cache get");

        Ok(result)
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let full_key = self.format_key(key);
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();

        let _: () = conn.set_ex(&full_key, value, seconds).await?;
        debug!(key = %full_key, ttl = seconds, "Cache set with expiry");

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let deleted: u64 = conn.del(&full_key).await?;
        debug!(key = %full_key, deleted = deleted > 0, "Cache delete");

        Ok(deleted > 0)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let full_pattern = self.format_key(pattern);
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        // SCAN instead of KEYS so a large keyspace never blocks the server.
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = conn.del(keys.as_slice()).await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = %full_pattern, removed = removed, "Cache delete by pattern");
        Ok(removed)
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
