//! Channel Repository Implementation
//!
//! PostgreSQL implementation of channels, membership and the pinned index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{Channel, ChannelRepository};
use crate::shared::error::AppError;

/// PostgreSQL channel repository implementation.
pub struct PgChannelRepository {
    pool: PgPool,
}

impl PgChannelRepository {
    /// Creates a new PgChannelRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for channel queries.
#[derive(Debug, sqlx::FromRow)]
struct ChannelRow {
    id: i64,
    name: String,
    description: Option<String>,
    owner_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Channel {
            id: row.id,
            name: row.name,
            description: row.description,
            owner_id: row.owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ChannelRepository for PgChannelRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Channel>, AppError> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, name, description, owner_id, created_at, updated_at
            FROM channels
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Channel::from))
    }

    async fn find_all(&self) -> Result<Vec<Channel>, AppError> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, name, description, owner_id, created_at, updated_at
            FROM channels
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Channel::from).collect())
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Channel>, AppError> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT c.id, c.name, c.description, c.owner_id, c.created_at, c.updated_at
            FROM channels c
            INNER JOIN channel_members cm ON cm.channel_id = c.id
            WHERE cm.user_id = $1
            ORDER BY c.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Channel::from).collect())
    }

    async fn create(&self, channel: &Channel) -> Result<Channel, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            INSERT INTO channels (id, name, description, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, description, owner_id, created_at, updated_at
            "#,
        )
        .bind(channel.id)
        .bind(&channel.name)
        .bind(&channel.description)
        .bind(channel.owner_id)
        .bind(channel.created_at)
        .bind(channel.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Channel with this ID already exists".to_string())
            }
            _ => AppError::Database(e),
        })?;

        // The owner is the first member
        sqlx::query(
            r#"
            INSERT INTO channel_members (channel_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (channel_id, user_id) DO NOTHING
            "#,
        )
        .bind(channel.id)
        .bind(channel.owner_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(row.into())
    }

    async fn update(&self, channel: &Channel) -> Result<Channel, AppError> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            UPDATE channels
            SET name = $2, description = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, owner_id, created_at, updated_at
            "#,
        )
        .bind(channel.id)
        .bind(&channel.name)
        .bind(&channel.description)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Channel::from)
            .ok_or_else(|| AppError::NotFound(format!("Channel {} not found", channel.id)))
    }

    async fn delete(&self, id: i64, owner_id: i64) -> Result<Option<Channel>, AppError> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            DELETE FROM channels
            WHERE id = $1 AND owner_id = $2
            RETURNING id, name, description, owner_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Channel::from))
    }

    async fn members(&self, channel_id: i64) -> Result<Vec<i64>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM channel_members
            WHERE channel_id = $1
            ORDER BY joined_at, user_id
            "#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn is_member(&self, channel_id: i64, user_id: i64) -> Result<bool, AppError> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM channel_members WHERE channel_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    async fn add_member(&self, channel_id: i64, user_id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO channel_members (channel_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (channel_id, user_id) DO NOTHING
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(format!("Channel {} not found", channel_id))
            }
            _ => AppError::Database(e),
        })?;

        Ok(())
    }

    async fn remove_member(&self, channel_id: i64, user_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "DELETE FROM channel_members WHERE channel_id = $1 AND user_id = $2",
        )
        .bind(channel_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn pinned_message_ids(&self, channel_id: i64) -> Result<Vec<i64>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT message_id FROM channel_pins
            WHERE channel_id = $1
            ORDER BY pinned_at DESC
            "#,
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// The channel row is locked for the duration of the count and insert,
    /// so concurrent pins cannot overshoot the cap.
    async fn add_pin(
        &self,
        channel_id: i64,
        message_id: i64,
        limit: usize,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM channels WHERE id = $1 FOR UPDATE")
                .bind(channel_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(AppError::NotFound(format!("Channel {} not found", channel_id)));
        }

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM channel_pins WHERE channel_id = $1")
                .bind(channel_id)
                .fetch_one(&mut *tx)
                .await?;
        if count >= limit as i64 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO channel_pins (channel_id, message_id)
            VALUES ($1, $2)
            ON CONFLICT (channel_id, message_id) DO NOTHING
            "#,
        )
        .bind(channel_id)
        .bind(message_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn remove_pin(&self, channel_id: i64, message_id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM channel_pins WHERE channel_id = $1 AND message_id = $2")
            .bind(channel_id)
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
