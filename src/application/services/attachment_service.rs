//! Attachment Service
//!
//! Validated uploads: bytes go to [`FileStorage`], metadata to the
//! attachment repository. A failed metadata write removes the stored file.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};

use super::Repositories;
use crate::application::events::EventDispatcher;
use crate::domain::events::AttachmentUploaded;
use crate::domain::{
    file_extension, is_allowed_extension, is_image, Attachment, ChatEvent, MAX_ATTACHMENT_SIZE,
};
use crate::infrastructure::storage::{storage_path, FileStorage};
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

/// A file uploaded to an existing message.
#[derive(Debug, Clone)]
pub struct UploadAttachmentInput {
    pub message_id: i64,
    pub user_id: i64,
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait AttachmentService: Send + Sync {
    async fn upload_attachment(&self, input: UploadAttachmentInput)
        -> Result<Attachment, AppError>;

    async fn get_attachments(&self, message_id: i64) -> Result<Vec<Attachment>, AppError>;
}

pub struct AttachmentServiceImpl {
    repos: Repositories,
    storage: Arc<dyn FileStorage>,
    dispatcher: Arc<dyn EventDispatcher>,
    id_generator: Arc<SnowflakeGenerator>,
}

impl AttachmentServiceImpl {
    pub fn new(
        repos: Repositories,
        storage: Arc<dyn FileStorage>,
        dispatcher: Arc<dyn EventDispatcher>,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            repos,
            storage,
            dispatcher,
            id_generator,
        }
    }
}

/// Size and type checks; returns the lowercased extension.
fn check_upload(input: &UploadAttachmentInput) -> Result<String, AppError> {
    if input.data.is_empty() {
        return Err(AppError::Validation("File is empty".into()));
    }
    if input.data.len() > MAX_ATTACHMENT_SIZE {
        return Err(AppError::Validation(format!(
            "File exceeds the {} byte limit",
            MAX_ATTACHMENT_SIZE
        )));
    }
    file_extension(&input.filename)
        .filter(|ext| is_allowed_extension(ext))
        .ok_or_else(|| {
            AppError::Validation(format!("File type of {} is not allowed", input.filename))
        })
}

#[async_trait]
impl AttachmentService for AttachmentServiceImpl {
    #[instrument(
        skip(self, input),
        fields(message_id = input.message_id, filename = %input.filename)
    )]
    async fn upload_attachment(
        &self,
        input: UploadAttachmentInput,
    ) -> Result<Attachment, AppError> {
        let message = self
            .repos
            .messages
            .find_by_id(input.message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", input.message_id)))?;
        if !message.is_sender(input.user_id) {
            return Err(AppError::Unauthorized(
                "Only the sender can attach files to this message".into(),
            ));
        }
        let ext = check_upload(&input)?;

        let path = storage_path(message.id, &input.data, &ext);
        let url = self
            .storage
            .upload_file(&path, &input.data, &input.content_type)
            .await?;

        let attachment = Attachment {
            id: self.id_generator.generate(),
            message_id: message.id,
            is_image: is_image(&input.content_type, &ext),
            size: input.data.len() as i64,
            filename: input.filename,
            content_type: input.content_type,
            url,
            created_at: Utc::now(),
        };

        let stored = match self.repos.attachments.create(&attachment).await {
            Ok(stored) => stored,
            Err(e) => {
                if let Err(cleanup) = self.storage.delete_file(&path).await {
                    warn!(path = %path, error = %cleanup, "Failed to remove orphaned upload");
                }
                return Err(e);
            }
        };

        info!(attachment_id = stored.id, size = stored.size, "Attachment uploaded");
        self.dispatcher
            .dispatch(ChatEvent::AttachmentUploaded(AttachmentUploaded {
                channel_id: message.channel_id,
                attachment: stored.clone(),
            }))
            .await;

        Ok(stored)
    }

    async fn get_attachments(&self, message_id: i64) -> Result<Vec<Attachment>, AppError> {
        self.repos.attachments.find_by_message(message_id).await
    }
}
