//! Message Repository Implementation
//!
//! PostgreSQL implementation of message storage, offset pagination,
//! thread listing, and filtered search.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::domain::{Message, MessageFilter, MessageFlags, MessageRepository, SearchPage};
use crate::shared::error::AppError;

const MESSAGE_COLUMNS: &str = "m.id, m.channel_id, m.sender_id, m.content, m.thread_id, \
     m.reply_to_id, m.pinned, m.pinned_by, m.pinned_at, m.mentions, m.nsfw, m.spoiler, \
     m.edited_at, m.created_at, m.updated_at";

/// PostgreSQL message repository implementation.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for message queries.
/// Maps to the messages table schema defined in the migration.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    channel_id: i64,
    sender_id: i64,
    content: String,
    thread_id: Option<i64>,
    reply_to_id: Option<i64>,
    pinned: bool,
    pinned_by: Option<i64>,
    pinned_at: Option<DateTime<Utc>>,
    mentions: Vec<i64>,
    nsfw: bool,
    spoiler: bool,
    edited_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MessageRow {
    /// Converts database row to domain Message entity.
    fn into_message(self) -> Message {
        Message {
            id: self.id,
            channel_id: self.channel_id,
            sender_id: self.sender_id,
            content: self.content,
            thread_id: self.thread_id,
            reply_to_id: self.reply_to_id,
            pinned: self.pinned,
            pinned_by: self.pinned_by,
            pinned_at: self.pinned_at,
            mentions: self.mentions,
            flags: MessageFlags {
                nsfw: self.nsfw,
                spoiler: self.spoiler,
            },
            edited_at: self.edited_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Appends the WHERE clause for `filter` to `qb`.
fn push_filter<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a MessageFilter) {
    qb.push(" WHERE TRUE");

    if let Some(channel_id) = filter.channel_id {
        qb.push(" AND m.channel_id = ").push_bind(channel_id);
    }
    if let Some(sender_id) = filter.sender_id {
        qb.push(" AND m.sender_id = ").push_bind(sender_id);
    }
    if let Some(query) = filter.query.as_deref().filter(|q| !q.is_empty()) {
        qb.push(" AND m.content ILIKE ")
            .push_bind(format!("%{}%", escape_like(query)));
    }
    if let Some(after) = filter.after {
        qb.push(" AND m.created_at > ").push_bind(after);
    }
    if let Some(before) = filter.before {
        qb.push(" AND m.created_at < ").push_bind(before);
    }
    if let Some(has) = filter.has_attachments {
        qb.push(if has { " AND " } else { " AND NOT " });
        qb.push("EXISTS (SELECT 1 FROM attachments a WHERE a.message_id = m.id)");
    }
    if let Some(has) = filter.has_mentions {
        qb.push(if has {
            " AND cardinality(m.mentions) > 0"
        } else {
            " AND cardinality(m.mentions) = 0"
        });
    }
    if let Some(pinned) = filter.pinned {
        qb.push(" AND m.pinned = ").push_bind(pinned);
    }
    if let Some(nsfw) = filter.nsfw {
        qb.push(" AND m.nsfw = ").push_bind(nsfw);
    }
    if let Some(spoiler) = filter.spoiler {
        qb.push(" AND m.spoiler = ").push_bind(spoiler);
    }
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {} FROM messages m WHERE m.id = $1",
            MESSAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_message()))
    }

    async fn find_by_channel(
        &self,
        channel_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {} FROM messages m
            WHERE m.channel_id = $1
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $2 OFFSET $3
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(channel_id)
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }

    async fn find_by_thread(&self, thread_id: i64) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {} FROM messages m
            WHERE m.thread_id = $1
            ORDER BY m.created_at ASC, m.id ASC
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }

    async fn find_referencing(&self, message_id: i64) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {} FROM messages m
            WHERE m.thread_id = $1 OR m.reply_to_id = $1
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }

    async fn find_pinned(&self, channel_id: i64) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            SELECT {} FROM messages m
            WHERE m.channel_id = $1 AND m.pinned = TRUE
            ORDER BY m.pinned_at DESC NULLS LAST
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }

    async fn search(&self, filter: &MessageFilter) -> Result<SearchPage, AppError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM messages m");
        push_filter(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM messages m",
            MESSAGE_COLUMNS
        ));
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY m.created_at DESC, m.id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows: Vec<MessageRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok(SearchPage {
            messages: rows.into_iter().map(|r| r.into_message()).collect(),
            total,
        })
    }

    async fn create(&self, message: &Message) -> Result<Message, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            INSERT INTO messages AS m (
                id, channel_id, sender_id, content, thread_id, reply_to_id,
                pinned, pinned_by, pinned_at, mentions, nsfw, spoiler,
                edited_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(message.id)
        .bind(message.channel_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.thread_id)
        .bind(message.reply_to_id)
        .bind(message.pinned)
        .bind(message.pinned_by)
        .bind(message.pinned_at)
        .bind(&message.mentions)
        .bind(message.flags.nsfw)
        .bind(message.flags.spoiler)
        .bind(message.edited_at)
        .bind(message.created_at)
        .bind(message.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Message with this ID already exists".to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(format!("Channel {} not found", message.channel_id))
            }
            _ => AppError::Database(e),
        })?;

        Ok(row.into_message())
    }

    async fn update(&self, message: &Message) -> Result<Message, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            UPDATE messages AS m
            SET content = $2, pinned = $3, pinned_by = $4, pinned_at = $5,
                mentions = $6, nsfw = $7, spoiler = $8, edited_at = $9,
                updated_at = $10
            WHERE m.id = $1
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(message.id)
        .bind(&message.content)
        .bind(message.pinned)
        .bind(message.pinned_by)
        .bind(message.pinned_at)
        .bind(&message.mentions)
        .bind(message.flags.nsfw)
        .bind(message.flags.spoiler)
        .bind(message.edited_at)
        .bind(message.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_message())
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message.id)))
    }

    async fn delete(&self, id: i64, sender_id: i64) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            DELETE FROM messages AS m
            WHERE m.id = $1 AND m.sender_id = $2
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(id)
        .bind(sender_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_message()))
    }
}
