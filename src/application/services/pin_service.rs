//! Pin Service
//!
//! Pinning and unpinning messages under the per-channel pin cap.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};

use super::Repositories;
use crate::application::events::EventDispatcher;
use crate::domain::{ChatEvent, Message, MAX_PINNED_MESSAGES};
use crate::shared::error::AppError;

#[async_trait]
pub trait PinService: Send + Sync {
    /// Pin a message (sender only)
    async fn pin_message(&self, message_id: i64, user_id: i64) -> Result<Message, AppError>;

    /// Unpin a message (sender only)
    async fn unpin_message(&self, message_id: i64, user_id: i64) -> Result<Message, AppError>;

    /// Pinned messages of a channel, most recently pinned first
    async fn get_pinned_messages(&self, channel_id: i64) -> Result<Vec<Message>, AppError>;
}

pub struct PinServiceImpl {
    repos: Repositories,
    dispatcher: Arc<dyn EventDispatcher>,
    limit: usize,
}

impl PinServiceImpl {
    pub fn new(repos: Repositories, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self::with_limit(repos, dispatcher, MAX_PINNED_MESSAGES)
    }

    pub fn with_limit(
        repos: Repositories,
        dispatcher: Arc<dyn EventDispatcher>,
        limit: usize,
    ) -> Self {
        Self {
            repos,
            dispatcher,
            limit,
        }
    }

    async fn sender_message(&self, message_id: i64, user_id: i64) -> Result<Message, AppError> {
        let message = self
            .repos
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message_id)))?;
        if !message.is_sender(user_id) {
            return Err(AppError::Unauthorized(
                "Only the sender can pin or unpin this message".into(),
            ));
        }
        Ok(message)
    }
}

/// Drop the index entry of a pin whose message row could not be written.
pub(crate) async fn undo_pin(repos: &Repositories, message: &Message) {
    if let Err(e) = repos
        .channels
        .remove_pin(message.channel_id, message.id)
        .await
    {
        warn!(message_id = message.id, error = %e, "Failed to roll back pinned index entry");
    }
}

/// Restore the index entry of an unpin whose message row could not be written.
async fn undo_unpin(repos: &Repositories, message: &Message, limit: usize) {
    match repos
        .channels
        .add_pin(message.channel_id, message.id, limit)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(message_id = message.id, "Pin slot taken before unpin rollback")
        }
        Err(e) => {
            warn!(message_id = message.id, error = %e, "Failed to restore pinned index entry")
        }
    }
}

#[async_trait]
impl PinService for PinServiceImpl {
    #[instrument(skip(self))]
    async fn pin_message(&self, message_id: i64, user_id: i64) -> Result<Message, AppError> {
        let mut message = self.sender_message(message_id, user_id).await?;
        if message.pinned {
            return Err(AppError::Validation("Message is already pinned".into()));
        }

        let added = self
            .repos
            .channels
            .add_pin(message.channel_id, message.id, self.limit)
            .await?;
        if !added {
            return Err(AppError::PinLimitExceeded { limit: self.limit });
        }

        message.pin(user_id, Utc::now());
        let updated = match self.repos.messages.update(&message).await {
            Ok(updated) => updated,
            Err(e) => {
                undo_pin(&self.repos, &message).await;
                return Err(e);
            }
        };

        info!(message_id, channel_id = updated.channel_id, "Message pinned");
        self.dispatcher
            .dispatch(ChatEvent::MessagePinned(updated.clone()))
            .await;

        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn unpin_message(&self, message_id: i64, user_id: i64) -> Result<Message, AppError> {
        let mut message = self.sender_message(message_id, user_id).await?;
        if !message.pinned {
            return Err(AppError::Validation("Message is not pinned".into()));
        }

        self.repos
            .channels
            .remove_pin(message.channel_id, message.id)
            .await?;

        message.unpin(Utc::now());
        let updated = match self.repos.messages.update(&message).await {
            Ok(updated) => updated,
            Err(e) => {
                undo_unpin(&self.repos, &message, self.limit).await;
                return Err(e);
            }
        };

        info!(message_id, channel_id = updated.channel_id, "Message unpinned");
        self.dispatcher
            .dispatch(ChatEvent::MessageUnpinned(updated.clone()))
            .await;

        Ok(updated)
    }

    async fn get_pinned_messages(&self, channel_id: i64) -> Result<Vec<Message>, AppError> {
        self.repos
            .channels
            .find_by_id(channel_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Channel {} not found", channel_id)))?;
        self.repos.messages.find_pinned(channel_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::application::services::test_support::Fixture;
    use crate::domain::{ChannelRepository, MessageRepository};
    use pretty_assertions::assert_eq;

    fn service(fx: &Fixture) -> PinServiceImpl {
        PinServiceImpl::new(fx.repos.clone(), fx.dispatcher.clone())
    }

    #[tokio::test]
    async fn test_pin_and_unpin() {
        let fx = Fixture::new().await;
        fx.message(10, 2).await;
        let svc = service(&fx);

        let pinned = svc.pin_message(10, 2).await.unwrap();
        assert!(pinned.pinned);
        assert_eq!(pinned.pinned_by, Some(2));
        assert_eq!(svc.get_pinned_messages(7).await.unwrap().len(), 1);

        let unpinned = svc.unpin_message(10, 2).await.unwrap();
        assert!(!unpinned.pinned);
        assert!(unpinned.pinned_at.is_none());
        assert!(svc.get_pinned_messages(7).await.unwrap().is_empty());
        assert_eq!(
            fx.recorder.types(),
            vec!["message_pinned", "message_unpinned"]
        );
    }

    #[tokio::test]
    async fn test_only_sender_may_pin() {
        let fx = Fixture::new().await;
        fx.message(10, 2).await;

        let err = service(&fx).pin_message(10, 1).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_repin_and_double_unpin_rejected() {
        let fx = Fixture::new().await;
        fx.message(10, 2).await;
        let svc = service(&fx);

        assert!(matches!(
            svc.unpin_message(10, 2).await.unwrap_err(),
            AppError::Validation(_)
        ));
        svc.pin_message(10, 2).await.unwrap();
        assert!(matches!(
            svc.pin_message(10, 2).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_cap_enforced() {
        let fx = Fixture::new().await;
        let svc = PinServiceImpl::with_limit(fx.repos.clone(), fx.dispatcher.clone(), 2);
        for id in 10..13 {
            fx.message(id, 2).await;
        }

        svc.pin_message(10, 2).await.unwrap();
        svc.pin_message(11, 2).await.unwrap();
        let err = svc.pin_message(12, 2).await.unwrap_err();

        assert!(matches!(err, AppError::PinLimitExceeded { limit: 2 }));
        assert_eq!(fx.repos.channels.pinned_message_ids(7).await.unwrap().len(), 2);
        assert!(!fx.repos.messages.find_by_id(12).await.unwrap().unwrap().pinned);
    }

    #[tokio::test]
    async fn test_failed_pin_write_leaves_index_empty() {
        let fx = Fixture::new().await;
        fx.message(10, 2).await;
        let (faulty, repos) = fx.faulty();
        faulty.fail_updates.store(true, Ordering::SeqCst);
        let svc = PinServiceImpl::new(repos, fx.dispatcher.clone());

        assert!(svc.pin_message(10, 2).await.is_err());
        assert!(fx.store.pinned_message_ids(7).await.unwrap().is_empty());
        assert!(fx.recorder.types().is_empty());
    }

    #[tokio::test]
    async fn test_failed_unpin_write_restores_index() {
        let fx = Fixture::new().await;
        fx.message(10, 2).await;
        let (faulty, repos) = fx.faulty();
        let svc = PinServiceImpl::new(repos, fx.dispatcher.clone());
        svc.pin_message(10, 2).await.unwrap();

        faulty.fail_updates.store(true, Ordering::SeqCst);
        assert!(svc.unpin_message(10, 2).await.is_err());

        assert_eq!(fx.store.pinned_message_ids(7).await.unwrap(), vec![10]);
        assert!(MessageRepository::find_by_id(fx.store.as_ref(), 10)
            .await
            .unwrap()
            .unwrap()
            .pinned);
    }
}
