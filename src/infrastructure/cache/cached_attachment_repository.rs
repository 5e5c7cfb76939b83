//! Cache-aside decorator for [`AttachmentRepository`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::cache_aside::CacheAside;
use super::cache_service::CacheStore;
use super::keys;
use crate::config::CacheSettings;
use crate::domain::{Attachment, AttachmentRepository};
use crate::shared::error::AppError;

pub struct CachedAttachmentRepository {
    inner: Arc<dyn AttachmentRepository>,
    cache: CacheAside,
    ttl: Duration,
}

impl CachedAttachmentRepository {
    pub fn new(
        inner: Arc<dyn AttachmentRepository>,
        store: Arc<dyn CacheStore>,
        settings: &CacheSettings,
    ) -> Self {
        Self {
            inner,
            cache: CacheAside::new(store, "attachment"),
            ttl: Duration::from_secs(settings.attachment_ttl),
        }
    }

    async fn invalidate_for(&self, attachment: &Attachment) {
        self.cache
            .invalidate(&[
                keys::attachment(attachment.id),
                keys::message_attachments(attachment.message_id),
            ])
            .await;
    }
}

#[async_trait]
impl AttachmentRepository for CachedAttachmentRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Attachment>, AppError> {
        self.cache
            .get_or_load_optional(&keys::attachment(id), self.ttl, || {
                self.inner.find_by_id(id)
            })
            .await
    }

    async fn find_by_message(&self, message_id: i64) -> Result<Vec<Attachment>, AppError> {
        self.cache
            .get_or_load(&keys::message_attachments(message_id), self.ttl, || {
                self.inner.find_by_message(message_id)
            })
            .await
    }

    async fn create(&self, attachment: &Attachment) -> Result<Attachment, AppError> {
        let created = self.inner.create(attachment).await?;
        self.invalidate_for(&created).await;
        Ok(created)
    }

    async fn delete(&self, id: i64) -> Result<Option<Attachment>, AppError> {
        let deleted = self.inner.delete(id).await?;
        if let Some(ref attachment) = deleted {
            self.invalidate_for(attachment).await;
        }
        Ok(deleted)
    }
}
