//! Reaction Repository Implementation
//!
//! PostgreSQL implementation of message reactions. A unique constraint on
//! (message_id, user_id, emoji) backs the one-reaction-per-emoji rule.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{Reaction, ReactionRepository};
use crate::shared::error::AppError;

pub struct PgReactionRepository {
    pool: PgPool,
}

impl PgReactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReactionRow {
    id: i64,
    message_id: i64,
    user_id: i64,
    emoji: String,
    created_at: DateTime<Utc>,
}

impl From<ReactionRow> for Reaction {
    fn from(row: ReactionRow) -> Self {
        Reaction {
            id: row.id,
            message_id: row.message_id,
            user_id: row.user_id,
            emoji: row.emoji,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ReactionRepository for PgReactionRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Reaction>, AppError> {
        let row = sqlx::query_as::<_, ReactionRow>(
            "SELECT id, message_id, user_id, emoji, created_at FROM reactions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Reaction::from))
    }

    async fn find_by_message(&self, message_id: i64) -> Result<Vec<Reaction>, AppError> {
        let rows = sqlx::query_as::<_, ReactionRow>(
            r#"
            SELECT id, message_id, user_id, emoji, created_at
            FROM reactions
            WHERE message_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Reaction::from).collect())
    }

    async fn create(&self, reaction: &Reaction) -> Result<Reaction, AppError> {
        let row = sqlx::query_as::<_, ReactionRow>(
            r#"
            INSERT INTO reactions (id, message_id, user_id, emoji, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, message_id, user_id, emoji, created_at
            "#,
        )
        .bind(reaction.id)
        .bind(reaction.message_id)
        .bind(reaction.user_id)
        .bind(&reaction.emoji)
        .bind(reaction.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Reaction already exists".to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(format!("Message {} not found", reaction.message_id))
            }
            _ => AppError::Database(e),
        })?;

        Ok(row.into())
    }

    async fn delete(&self, id: i64, user_id: i64) -> Result<Option<Reaction>, AppError> {
        let row = sqlx::query_as::<_, ReactionRow>(
            r#"
            DELETE FROM reactions
            WHERE id = $1 AND user_id = $2
            RETURNING id, message_id, user_id, emoji, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Reaction::from))
    }
}
