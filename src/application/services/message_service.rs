//! Message Service
//!
//! Handles message operations including send, edit, delete and listing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use validator::Validate;

use super::pin_service::undo_pin;
use super::Repositories;
use crate::application::events::EventDispatcher;
use crate::domain::events::{MessageCreated, MessageDeleted};
use crate::domain::{
    file_extension, is_allowed_extension, is_image, Attachment, ChatEvent, Message,
    MessageFlags, MAX_ATTACHMENT_SIZE, MAX_CONTENT_LENGTH, MAX_PINNED_MESSAGES,
};
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;
use crate::shared::validation::validation_error;

/// Default page size for channel history.
const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

/// Message service trait
#[async_trait]
pub trait MessageService: Send + Sync {
    /// Send a message to a channel
    async fn send_message(&self, input: SendMessageInput) -> Result<Message, AppError>;

    /// Edit a message (sender only)
    async fn edit_message(
        &self,
        message_id: i64,
        user_id: i64,
        content: String,
    ) -> Result<Message, AppError>;

    /// Delete a message (sender only)
    async fn delete_message(&self, message_id: i64, user_id: i64) -> Result<(), AppError>;

    /// Get a single message
    async fn get_message(&self, message_id: i64) -> Result<Message, AppError>;

    /// Get one page of a channel's messages, newest first
    async fn get_channel_messages(
        &self,
        channel_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<MessagePage, AppError>;

    /// Get the replies of a thread, oldest first
    async fn get_thread_messages(&self, thread_id: i64) -> Result<Vec<Message>, AppError>;
}

/// Attachment metadata supplied with a new message.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAttachment {
    #[validate(length(min = 1, max = 255, message = "Filename must be 1-255 characters"))]
    pub filename: String,
    pub content_type: String,
    #[validate(range(min = 0, message = "Size must not be negative"))]
    pub size: i64,
    #[validate(length(min = 1, message = "URL must not be empty"))]
    pub url: String,
}

/// Send message request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageInput {
    pub channel_id: i64,
    pub sender_id: i64,
    #[validate(length(max = 4000, message = "Content must be at most 4000 characters"))]
    pub content: String,
    pub thread_id: Option<i64>,
    pub reply_to_id: Option<i64>,
    #[serde(default)]
    pub mentions: Vec<i64>,
    #[serde(default)]
    pub flags: MessageFlags,
    #[serde(default)]
    #[validate(nested)]
    pub attachments: Vec<NewAttachment>,
    /// Pin the message right after it is stored
    #[serde(default)]
    pub pin: bool,
}

/// One page of channel history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub limit: i64,
    pub offset: i64,
}

/// MessageService implementation
pub struct MessageServiceImpl {
    repos: Repositories,
    dispatcher: Arc<dyn EventDispatcher>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl MessageServiceImpl {
    pub fn new(
        repos: Repositories,
        dispatcher: Arc<dyn EventDispatcher>,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            repos,
            dispatcher,
            id_generator,
        }
    }

    async fn load_message(&self, message_id: i64) -> Result<Message, AppError> {
        self.repos
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message_id)))
    }

    /// A reply or thread root must exist and live in the same channel.
    async fn check_reference(
        &self,
        channel_id: i64,
        target_id: i64,
        what: &str,
    ) -> Result<(), AppError> {
        let target = self.repos.messages.find_by_id(target_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("{} target {} not found", what, target_id))
        })?;
        if target.channel_id != channel_id {
            return Err(AppError::Validation(format!(
                "{} target must be in the same channel",
                what
            )));
        }
        Ok(())
    }

    fn validate_send(input: &SendMessageInput) -> Result<(), AppError> {
        input.validate().map_err(validation_error)?;

        if input.content.trim().is_empty() && input.attachments.is_empty() {
            return Err(AppError::Validation(
                "Message must have content or attachments".into(),
            ));
        }
        if input.content.chars().count() > MAX_CONTENT_LENGTH {
            return Err(AppError::Validation(format!(
                "Content must be at most {} characters",
                MAX_CONTENT_LENGTH
            )));
        }
        for attachment in &input.attachments {
            if attachment.size as u64 > MAX_ATTACHMENT_SIZE as u64 {
                return Err(AppError::Validation(format!(
                    "Attachment {} exceeds the {} byte limit",
                    attachment.filename, MAX_ATTACHMENT_SIZE
                )));
            }
            let allowed = file_extension(&attachment.filename)
                .is_some_and(|ext| is_allowed_extension(&ext));
            if !allowed {
                return Err(AppError::Validation(format!(
                    "File type of {} is not allowed",
                    attachment.filename
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageService for MessageServiceImpl {
    #[instrument(
        skip(self, input),
        fields(channel_id = input.channel_id, sender_id = input.sender_id)
    )]
    async fn send_message(&self, input: SendMessageInput) -> Result<Message, AppError> {
        Self::validate_send(&input)?;

        self.repos
            .channels
            .find_by_id(input.channel_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Channel {} not found", input.channel_id)))?;

        if !self
            .repos
            .channels
            .is_member(input.channel_id, input.sender_id)
            .await?
        {
            return Err(AppError::Unauthorized(
                "Sender is not a member of this channel".into(),
            ));
        }

        if let Some(reply_to) = input.reply_to_id {
            self.check_reference(input.channel_id, reply_to, "Reply").await?;
        }
        if let Some(thread_id) = input.thread_id {
            self.check_reference(input.channel_id, thread_id, "Thread").await?;
        }

        if input.pin {
            let pinned = self
                .repos
                .channels
                .pinned_message_ids(input.channel_id)
                .await?;
            if pinned.len() >= MAX_PINNED_MESSAGES {
                return Err(AppError::PinLimitExceeded {
                    limit: MAX_PINNED_MESSAGES,
                });
            }
        }

        let now = Utc::now();
        let mut mentions = input.mentions;
        mentions.sort_unstable();
        mentions.dedup();

        let message = Message {
            id: self.id_generator.generate(),
            channel_id: input.channel_id,
            sender_id: input.sender_id,
            content: input.content,
            thread_id: input.thread_id,
            reply_to_id: input.reply_to_id,
            mentions,
            flags: input.flags,
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        let mut message = self.repos.messages.create(&message).await?;

        let mut attachments = Vec::with_capacity(input.attachments.len());
        for new in input.attachments {
            let ext = file_extension(&new.filename).unwrap_or_default();
            let attachment = Attachment {
                id: self.id_generator.generate(),
                message_id: message.id,
                is_image: is_image(&new.content_type, &ext),
                filename: new.filename,
                content_type: new.content_type,
                size: new.size,
                url: new.url,
                created_at: now,
            };
            match self.repos.attachments.create(&attachment).await {
                Ok(stored) => attachments.push(stored),
                Err(e) => {
                    warn!(
                        message_id = message.id,
                        error = %e,
                        "Attachment write failed after message was stored"
                    );
                    return Err(e);
                }
            }
        }

        if input.pin {
            let added = self
                .repos
                .channels
                .add_pin(message.channel_id, message.id, MAX_PINNED_MESSAGES)
                .await?;
            if !added {
                warn!(message_id = message.id, "Pin cap reached after message was stored");
                return Err(AppError::PinLimitExceeded {
                    limit: MAX_PINNED_MESSAGES,
                });
            }
            message.pin(message.sender_id, Utc::now());
            message = match self.repos.messages.update(&message).await {
                Ok(updated) => updated,
                Err(e) => {
                    undo_pin(&self.repos, &message).await;
                    return Err(e);
                }
            };
        }

        info!(message_id = message.id, attachments = attachments.len(), "Message sent");

        self.dispatcher
            .dispatch(ChatEvent::MessageCreated(MessageCreated {
                message: message.clone(),
                attachments,
            }))
            .await;

        Ok(message)
    }

    #[instrument(skip(self, content))]
    async fn edit_message(
        &self,
        message_id: i64,
        user_id: i64,
        content: String,
    ) -> Result<Message, AppError> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("Content must not be empty".into()));
        }
        if content.chars().count() > MAX_CONTENT_LENGTH {
            return Err(AppError::Validation(format!(
                "Content must be at most {} characters",
                MAX_CONTENT_LENGTH
            )));
        }

        let mut message = self.load_message(message_id).await?;
        if !message.is_sender(user_id) {
            return Err(AppError::Unauthorized(
                "Only the sender can edit this message".into(),
            ));
        }

        message.edit(content, Utc::now());
        let updated = self.repos.messages.update(&message).await?;

        self.dispatcher
            .dispatch(ChatEvent::MessageUpdated(updated.clone()))
            .await;

        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn delete_message(&self, message_id: i64, user_id: i64) -> Result<(), AppError> {
        let deleted = self
            .repos
            .messages
            .delete(message_id, user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Message {} not found or not owned by the caller",
                    message_id
                ))
            })?;

        if deleted.pinned {
            self.repos
                .channels
                .remove_pin(deleted.channel_id, deleted.id)
                .await?;
        }

        info!(message_id, channel_id = deleted.channel_id, "Message deleted");

        self.dispatcher
            .dispatch(ChatEvent::MessageDeleted(MessageDeleted {
                message_id: deleted.id,
                channel_id: deleted.channel_id,
                thread_id: deleted.thread_id,
            }))
            .await;

        Ok(())
    }

    async fn get_message(&self, message_id: i64) -> Result<Message, AppError> {
        self.load_message(message_id).await
    }

    async fn get_channel_messages(
        &self,
        channel_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<MessagePage, AppError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);

        let messages = self
            .repos
            .messages
            .find_by_channel(channel_id, limit, offset)
            .await?;

        Ok(MessagePage {
            messages,
            limit,
            offset,
        })
    }

    async fn get_thread_messages(&self, thread_id: i64) -> Result<Vec<Message>, AppError> {
        self.load_message(thread_id).await?;
        self.repos.messages.find_by_thread(thread_id).await
    }
}
