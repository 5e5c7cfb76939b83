//! Read Receipt Repository Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{ReadReceipt, ReadReceiptRepository};
use crate::shared::error::AppError;

pub struct PgReadReceiptRepository {
    pool: PgPool,
}

impl PgReadReceiptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReadReceiptRow {
    message_id: i64,
    user_id: i64,
    read_at: DateTime<Utc>,
}

#[async_trait]
impl ReadReceiptRepository for PgReadReceiptRepository {
    async fn create_if_absent(&self, receipt: &ReadReceipt) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO read_receipts (message_id, user_id, read_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(receipt.message_id)
        .bind(receipt.user_id)
        .bind(receipt.read_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_message(&self, message_id: i64) -> Result<Vec<ReadReceipt>, AppError> {
        let rows = sqlx::query_as::<_, ReadReceiptRow>(
            r#"
            SELECT message_id, user_id, read_at
            FROM read_receipts
            WHERE message_id = $1
            ORDER BY read_at ASC
            "#,
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| ReadReceipt {
                message_id: r.message_id,
                user_id: r.user_id,
                read_at: r.read_at,
            })
            .collect())
    }

    async fn mark_channel_read(
        &self,
        channel_id: i64,
        user_id: i64,
        read_at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO read_receipts (message_id, user_id, read_at)
            SELECT m.id, $2, $3
            FROM messages m
            WHERE m.channel_id = $1 AND m.sender_id <> $2
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(read_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
