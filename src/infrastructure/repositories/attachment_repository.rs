//! Attachment Repository Implementation
//!
//! PostgreSQL implementation of attachment metadata storage. File bytes
//! live in the configured `FileStorage`; only metadata is stored here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{Attachment, AttachmentRepository};
use crate::shared::error::AppError;

pub struct PgAttachmentRepository {
    pool: PgPool,
}

impl PgAttachmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttachmentRow {
    id: i64,
    message_id: i64,
    filename: String,
    content_type: String,
    size: i64,
    url: String,
    is_image: bool,
    created_at: DateTime<Utc>,
}

impl From<AttachmentRow> for Attachment {
    fn from(row: AttachmentRow) -> Self {
        Attachment {
            id: row.id,
            message_id: row.message_id,
            filename: row.filename,
            content_type: row.content_type,
            size: row.size,
            url: row.url,
            is_image: row.is_image,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl AttachmentRepository for PgAttachmentRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Attachment>, AppError> {
        let row = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT id, message_id, filename, content_type, size, url, is_image, created_at
            FROM attachments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Attachment::from))
    }

    async fn find_by_message(&self, message_id: i64) -> Result<Vec<Attachment>, AppError> {
        let rows = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT id, message_id, filename, content_type, size, url, is_image, created_at
            FROM attachments
            WHERE message_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Attachment::from).collect())
    }

    async fn create(&self, attachment: &Attachment) -> Result<Attachment, AppError> {
        let row = sqlx::query_as::<_, AttachmentRow>(
            r#"
            INSERT INTO attachments
                (id, message_id, filename, content_type, size, url, is_image, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, message_id, filename, content_type, size, url, is_image, created_at
            "#,
        )
        .bind(attachment.id)
        .bind(attachment.message_id)
        .bind(&attachment.filename)
        .bind(&attachment.content_type)
        .bind(attachment.size)
        .bind(&attachment.url)
        .bind(attachment.is_image)
        .bind(attachment.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(format!("Message {} not found", attachment.message_id))
            }
            _ => AppError::Database(e),
        })?;

        Ok(row.into())
    }

    async fn delete(&self, id: i64) -> Result<Option<Attachment>, AppError> {
        let row = sqlx::query_as::<_, AttachmentRow>(
            r#"
            DELETE FROM attachments
            WHERE id = $1
            RETURNING id, message_id, filename, content_type, size, url, is_image, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Attachment::from))
    }
}
