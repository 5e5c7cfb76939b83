//! Cache-aside decorator for [`MessageRepository`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use super::cache_aside::CacheAside;
use super::cache_service::CacheStore;
use super::keys;
use crate::config::CacheSettings;
use crate::domain::{Message, MessageFilter, MessageRepository, SearchPage};
use crate::shared::error::AppError;

/// Caches single messages, channel pages, thread listings and the pinned
/// listing. Search results are never cached.
pub struct CachedMessageRepository {
    inner: Arc<dyn MessageRepository>,
    cache: CacheAside,
    message_ttl: Duration,
    page_ttl: Duration,
    thread_ttl: Duration,
    pinned_ttl: Duration,
}

impl CachedMessageRepository {
    pub fn new(
        inner: Arc<dyn MessageRepository>,
        store: Arc<dyn CacheStore>,
        settings: &CacheSettings,
    ) -> Self {
        Self {
            inner,
            cache: CacheAside::new(store, "message"),
            message_ttl: Duration::from_secs(settings.message_ttl),
            page_ttl: Duration::from_secs(settings.channel_messages_ttl),
            thread_ttl: Duration::from_secs(settings.thread_messages_ttl),
            pinned_ttl: Duration::from_secs(settings.channel_pinned_ttl),
        }
    }

    /// Drop the message key and every listing the message can appear in.
    async fn invalidate_for(&self, message: &Message, deleted: bool) {
        let mut keys = vec![
            keys::message(message.id),
            keys::channel_pinned(message.channel_id),
        ];
        if let Some(thread_id) = message.thread_id {
            keys.push(keys::thread_messages(thread_id));
        }
        if deleted {
            keys.push(keys::message_reactions(message.id));
            keys.push(keys::message_attachments(message.id));
        }
        self.cache.invalidate(&keys).await;
        self.cache
            .invalidate_patterns(&[keys::channel_messages_pattern(message.channel_id)])
            .await;
    }

    /// Keys of other messages a delete of `id` rewrites in the durable
    /// store: thread replies go with their root (recursively) and replies
    /// to any removed message lose their reply target.
    async fn dependent_keys(&self, id: i64) -> Result<Vec<String>, AppError> {
        let mut keys = vec![keys::thread_messages(id)];
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for other in self.inner.find_referencing(current).await? {
                keys.push(keys::message(other.id));
                if let Some(thread_id) = other.thread_id {
                    keys.push(keys::thread_messages(thread_id));
                }
                if other.thread_id == Some(current) && seen.insert(other.id) {
                    keys.push(keys::thread_messages(other.id));
                    keys.push(keys::message_reactions(other.id));
                    keys.push(keys::message_attachments(other.id));
                    queue.push_back(other.id);
                }
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl MessageRepository for CachedMessageRepository {
    #[instrument(skip(self), level = "debug")]
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        self.cache
            .get_or_load_optional(&keys::message(id), self.message_ttl, || {
                self.inner.find_by_id(id)
            })
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn find_by_channel(
        &self,
        channel_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, AppError> {
        let key = keys::channel_messages_page(channel_id, offset, limit);
        self.cache
            .get_or_load(&key, self.page_ttl, || {
                self.inner.find_by_channel(channel_id, limit, offset)
            })
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn find_by_thread(&self, thread_id: i64) -> Result<Vec<Message>, AppError> {
        self.cache
            .get_or_load(&keys::thread_messages(thread_id), self.thread_ttl, || {
                self.inner.find_by_thread(thread_id)
            })
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn find_referencing(&self, message_id: i64) -> Result<Vec<Message>, AppError> {
        self.inner.find_referencing(message_id).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn find_pinned(&self, channel_id: i64) -> Result<Vec<Message>, AppError> {
        self.cache
            .get_or_load(&keys::channel_pinned(channel_id), self.pinned_ttl, || {
                self.inner.find_pinned(channel_id)
            })
            .await
    }

    async fn search(&self, filter: &MessageFilter) -> Result<SearchPage, AppError> {
        self.inner.search(filter).await
    }

    async fn create(&self, message: &Message) -> Result<Message, AppError> {
        let created = self.inner.create(message).await?;
        self.invalidate_for(&created, false).await;
        Ok(created)
    }

    async fn update(&self, message: &Message) -> Result<Message, AppError> {
        let updated = self.inner.update(message).await?;
        self.invalidate_for(&updated, false).await;
        Ok(updated)
    }

    async fn delete(&self, id: i64, sender_id: i64) -> Result<Option<Message>, AppError> {
        let dependents = self.dependent_keys(id).await?;
        let deleted = self.inner.delete(id, sender_id).await?;
        if let Some(ref message) = deleted {
            self.invalidate_for(message, true).await;
            self.cache.invalidate(&dependents).await;
        }
        Ok(deleted)
    }
}
