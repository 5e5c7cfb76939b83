//! Cache-aside primitives shared by the cached repositories.
//!
//! Reads are fail-open: a store error or an undecodable entry is a miss.
//! Writes and invalidations are best effort: failures are logged and
//! swallowed, because the durable store has already committed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::cache_service::CacheStore;
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Cache access for one entity family.
#[derive(Clone)]
pub struct CacheAside {
    store: Arc<dyn CacheStore>,
    entity: &'static str,
}

impl CacheAside {
    /// `entity` labels logs and metrics ("channel", "message", ...).
    pub fn new(store: Arc<dyn CacheStore>, entity: &'static str) -> Self {
        Self { store, entity }
    }

    /// Look up and decode `key`. Any failure is reported as a miss.
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    metrics::record_cache_lookup(self.entity, "hit");
                    debug!(entity = self.entity, key = %key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    metrics::record_cache_lookup(self.entity, "error");
                    warn!(
                        entity = self.entity,
                        key = %key,
                        error = %e,
                        "Discarding undecodable cache entry"
                    );
                    None
                }
            },
            Ok(None) => {
                metrics::record_cache_lookup(self.entity, "miss");
                debug!(entity = self.entity, key = %key, "Cache miss");
                None
            }
            Err(e) => {
                metrics::record_cache_lookup(self.entity, "error");
                warn!(
                    entity = self.entity,
                    key = %key,
                    error = %e,
                    "Cache read failed, treating as miss"
                );
                None
            }
        }
    }

    /// Populate `key`. Failures are logged only.
    pub async fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(entity = self.entity, key = %key, error = %e, "Cache serialization failed");
                return;
            }
        };
        if let Err(e) = self.store.set(key, bytes, ttl).await {
            warn!(entity = self.entity, key = %key, error = %e, "Cache populate failed");
        }
    }

    /// Read-through for values that are always cached (collections).
    pub async fn get_or_load<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, AppError>> + Send,
    {
        if let Some(cached) = self.lookup(key).await {
            return Ok(cached);
        }
        let value = load().await?;
        self.store(key, &value, ttl).await;
        Ok(value)
    }

    /// Read-through for single entities. Absent rows are not cached.
    pub async fn get_or_load_optional<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        load: F,
    ) -> Result<Option<T>, AppError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, AppError>> + Send,
    {
        if let Some(cached) = self.lookup::<T>(key).await {
            return Ok(Some(cached));
        }
        let value = load().await?;
        if let Some(ref found) = value {
            self.store(key, found, ttl).await;
        }
        Ok(value)
    }

    /// Remove every key in `keys`. Each deletion is attempted even if an
    /// earlier one failed.
    pub async fn invalidate(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.store.delete(key).await {
                warn!(entity = self.entity, key = %key, error = %e, "Cache invalidation failed");
            }
        }
    }

    /// Remove every key matching each glob pattern.
    pub async fn invalidate_patterns(&self, patterns: &[String]) {
        for pattern in patterns {
            if let Err(e) = self.store.delete_pattern(pattern).await {
                warn!(
                    entity = self.entity,
                    pattern = %pattern,
                    error = %e,
                    "Cache pattern invalidation failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for CacheAside {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAside")
            .field("entity", &self.entity)
            .finish_non_exhaustive()
    }
}
