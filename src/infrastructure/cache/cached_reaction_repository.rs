//! Cache-aside decorator for [`ReactionRepository`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::cache_aside::CacheAside;
use super::cache_service::CacheStore;
use super::keys;
use crate::config::CacheSettings;
use crate::domain::{Reaction, ReactionRepository};
use crate::shared::error::AppError;

pub struct CachedReactionRepository {
    inner: Arc<dyn ReactionRepository>,
    cache: CacheAside,
    ttl: Duration,
}

impl CachedReactionRepository {
    pub fn new(
        inner: Arc<dyn ReactionRepository>,
        store: Arc<dyn CacheStore>,
        settings: &CacheSettings,
    ) -> Self {
        Self {
            inner,
            cache: CacheAside::new(store, "reaction"),
            ttl: Duration::from_secs(settings.message_reactions_ttl),
        }
    }
}

#[async_trait]
impl ReactionRepository for CachedReactionRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Reaction>, AppError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_message(&self, message_id: i64) -> Result<Vec<Reaction>, AppError> {
        self.cache
            .get_or_load(&keys::message_reactions(message_id), self.ttl, || {
                self.inner.find_by_message(message_id)
            })
            .await
    }

    async fn create(&self, reaction: &Reaction) -> Result<Reaction, AppError> {
        let created = self.inner.create(reaction).await?;
        self.cache
            .invalidate(&[keys::message_reactions(created.message_id)])
            .await;
        Ok(created)
    }

    async fn delete(&self, id: i64, user_id: i64) -> Result<Option<Reaction>, AppError> {
        let deleted = self.inner.delete(id, user_id).await?;
        if let Some(ref reaction) = deleted {
            self.cache
                .invalidate(&[keys::message_reactions(reaction.message_id)])
                .await;
        }
        Ok(deleted)
    }
}
