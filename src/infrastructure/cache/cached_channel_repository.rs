//! Cache-aside decorator for [`ChannelRepository`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use super::cache_aside::CacheAside;
use super::cache_service::CacheStore;
use super::keys;
use crate::config::CacheSettings;
use crate::domain::{Channel, ChannelRepository};
use crate::shared::error::AppError;

/// Caches channels, member lists and per-user channel lists.
///
/// Membership checks go through the cached member list, so a hot channel
/// answers `is_member` without touching the durable store.
pub struct CachedChannelRepository {
    inner: Arc<dyn ChannelRepository>,
    cache: CacheAside,
    channel_ttl: Duration,
    members_ttl: Duration,
    user_channels_ttl: Duration,
}

impl CachedChannelRepository {
    pub fn new(
        inner: Arc<dyn ChannelRepository>,
        store: Arc<dyn CacheStore>,
        settings: &CacheSettings,
    ) -> Self {
        Self {
            inner,
            cache: CacheAside::new(store, "channel"),
            channel_ttl: Duration::from_secs(settings.channel_ttl),
            members_ttl: Duration::from_secs(settings.channel_members_ttl),
            user_channels_ttl: Duration::from_secs(settings.user_channels_ttl),
        }
    }
}

#[async_trait]
impl ChannelRepository for CachedChannelRepository {
    #[instrument(skip(self), level = "debug")]
    async fn find_by_id(&self, id: i64) -> Result<Option<Channel>, AppError> {
        self.cache
            .get_or_load_optional(&keys::channel(id), self.channel_ttl, || {
                self.inner.find_by_id(id)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Channel>, AppError> {
        self.inner.find_all().await
    }

    #[instrument(skip(self), level = "debug")]
    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Channel>, AppError> {
        self.cache
            .get_or_load(&keys::user_channels(user_id), self.user_channels_ttl, || {
                self.inner.find_by_user(user_id)
            })
            .await
    }

    async fn create(&self, channel: &Channel) -> Result<Channel, AppError> {
        let created = self.inner.create(channel).await?;
        self.cache
            .invalidate(&[
                keys::channel(created.id),
                keys::channel_members(created.id),
                keys::user_channels(created.owner_id),
            ])
            .await;
        Ok(created)
    }

    async fn update(&self, channel: &Channel) -> Result<Channel, AppError> {
        let updated = self.inner.update(channel).await?;
        self.cache.invalidate(&[keys::channel(updated.id)]).await;
        self.cache
            .invalidate_patterns(&[keys::ALL_USER_CHANNELS.to_string()])
            .await;
        Ok(updated)
    }

    async fn delete(&self, id: i64, owner_id: i64) -> Result<Option<Channel>, AppError> {
        let deleted = self.inner.delete(id, owner_id).await?;
        if deleted.is_some() {
            self.cache
                .invalidate(&[
                    keys::channel(id),
                    keys::channel_members(id),
                    keys::channel_pinned(id),
                ])
                .await;
            self.cache
                .invalidate_patterns(&[
                    keys::channel_messages_pattern(id),
                    keys::ALL_USER_CHANNELS.to_string(),
                ])
                .await;
        }
        Ok(deleted)
    }

    #[instrument(skip(self), level = "debug")]
    async fn members(&self, channel_id: i64) -> Result<Vec<i64>, AppError> {
        self.cache
            .get_or_load(&keys::channel_members(channel_id), self.members_ttl, || {
                self.inner.members(channel_id)
            })
            .await
    }

    async fn is_member(&self, channel_id: i64, user_id: i64) -> Result<bool, AppError> {
        Ok(self.members(channel_id).await?.contains(&user_id))
    }

    async fn add_member(&self, channel_id: i64, user_id: i64) -> Result<(), AppError> {
        self.inner.add_member(channel_id, user_id).await?;
        self.cache
            .invalidate(&[
                keys::channel_members(channel_id),
                keys::user_channels(user_id),
            ])
            .await;
        Ok(())
    }

    async fn remove_member(&self, channel_id: i64, user_id: i64) -> Result<bool, AppError> {
        let removed = self.inner.remove_member(channel_id, user_id).await?;
        if removed {
            self.cache
                .invalidate(&[
                    keys::channel_members(channel_id),
                    keys::user_channels(user_id),
                ])
                .await;
        }
        Ok(removed)
    }

    async fn pinned_message_ids(&self, channel_id: i64) -> Result<Vec<i64>, AppError> {
        self.inner.pinned_message_ids(channel_id).await
    }

    async fn add_pin(
        &self,
        channel_id: i64,
        message_id: i64,
        limit: usize,
    ) -> Result<bool, AppError> {
        let added = self.inner.add_pin(channel_id, message_id, limit).await?;
        if added {
            self.cache
                .invalidate(&[keys::channel_pinned(channel_id)])
                .await;
        }
        Ok(added)
    }

    async fn remove_pin(&self, channel_id: i64, message_id: i64) -> Result<(), AppError> {
        self.inner.remove_pin(channel_id, message_id).await?;
        self.cache
            .invalidate(&[keys::channel_pinned(channel_id)])
            .await;
        Ok(())
    }
}
