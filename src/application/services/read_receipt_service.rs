//! Read Receipt Service

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use super::Repositories;
use crate::application::events::EventDispatcher;
use crate::domain::events::{ChannelRead, MessageRead};
use crate::domain::{ChatEvent, ReadReceipt};
use crate::shared::error::AppError;

#[async_trait]
pub trait ReadReceiptService: Send + Sync {
    /// Mark one message read. Returns whether a new receipt was created;
    /// the sender reading their own message is a no-op.
    async fn mark_as_read(&self, message_id: i64, user_id: i64) -> Result<bool, AppError>;

    /// Mark every message of a channel not sent by the user. Returns the
    /// number of receipts created.
    async fn mark_channel_as_read(&self, channel_id: i64, user_id: i64) -> Result<u64, AppError>;

    async fn get_message_read_receipts(&self, message_id: i64)
        -> Result<Vec<ReadReceipt>, AppError>;
}

pub struct ReadReceiptServiceImpl {
    repos: Repositories,
    dispatcher: Arc<dyn EventDispatcher>,
}

impl ReadReceiptServiceImpl {
    pub fn new(repos: Repositories, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        Self { repos, dispatcher }
    }
}

#[async_trait]
impl ReadReceiptService for ReadReceiptServiceImpl {
    #[instrument(skip(self))]
    async fn mark_as_read(&self, message_id: i64, user_id: i64) -> Result<bool, AppError> {
        let message = self
            .repos
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message_id)))?;

        if message.is_sender(user_id) {
            debug!("Sender read their own message, nothing to record");
            return Ok(false);
        }

        let receipt = ReadReceipt {
            message_id,
            user_id,
            read_at: Utc::now(),
        };
        let created = self.repos.receipts.create_if_absent(&receipt).await?;

        if created {
            self.dispatcher
                .dispatch(ChatEvent::MessageRead(MessageRead {
                    channel_id: message.channel_id,
                    message_id,
                    user_id,
                    read_at: receipt.read_at,
                }))
                .await;
        }

        Ok(created)
    }

    #[instrument(skip(self))]
    async fn mark_channel_as_read(&self, channel_id: i64, user_id: i64) -> Result<u64, AppError> {
        self.repos
            .channels
            .find_by_id(channel_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Channel {} not found", channel_id)))?;

        let read_at = Utc::now();
        let marked = self
            .repos
            .receipts
            .mark_channel_read(channel_id, user_id, read_at)
            .await?;
        debug!(marked, "Channel marked as read");

        self.dispatcher
            .dispatch(ChatEvent::ChannelRead(ChannelRead {
                channel_id,
                user_id,
                read_at,
                marked,
            }))
            .await;

        Ok(marked)
    }

    async fn get_message_read_receipts(
        &self,
        message_id: i64,
    ) -> Result<Vec<ReadReceipt>, AppError> {
        self.repos
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message_id)))?;
        self.repos.receipts.find_by_message(message_id).await
    }
}
