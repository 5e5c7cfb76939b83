//! Message entity, search filter and repository trait.
//!
//! Maps to the `messages` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Maximum message content length in characters.
pub const MAX_CONTENT_LENGTH: usize = 4000;

/// Per-message content flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub spoiler: bool,
}

/// Represents a message in a channel.
///
/// Maps to the `messages` table:
/// - id: BIGINT PRIMARY KEY (Snowflake ID)
/// - channel_id: BIGINT NOT NULL REFERENCES channels(id)
/// - sender_id: BIGINT NOT NULL
/// - content: TEXT NOT NULL
/// - thread_id / reply_to_id: BIGINT NULL REFERENCES messages(id)
/// - pinned, pinned_by, pinned_at
/// - mentions: BIGINT[] NOT NULL DEFAULT '{}'
/// - nsfw, spoiler: BOOLEAN NOT NULL DEFAULT FALSE
/// - edited_at, created_at, updated_at: TIMESTAMPTZ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Snowflake ID (primary key)
    pub id: i64,

    /// Channel the message belongs to
    pub channel_id: i64,

    /// User who sent the message
    pub sender_id: i64,

    pub content: String,

    /// Root message of the thread this message lives in
    pub thread_id: Option<i64>,

    /// Message this one replies to (same channel)
    pub reply_to_id: Option<i64>,

    pub pinned: bool,
    pub pinned_by: Option<i64>,
    pub pinned_at: Option<DateTime<Utc>>,

    /// Mentioned user IDs
    #[serde(default)]
    pub mentions: Vec<i64>,

    #[serde(default)]
    pub flags: MessageFlags,

    /// Timestamp of the last content edit (None if never edited)
    pub edited_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn is_sender(&self, user_id: i64) -> bool {
        self.sender_id == user_id
    }

    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to_id.is_some()
    }

    /// Mark the message pinned by `user_id` at `at`.
    pub fn pin(&mut self, user_id: i64, at: DateTime<Utc>) {
        self.pinned = true;
        self.pinned_by = Some(user_id);
        self.pinned_at = Some(at);
        self.updated_at = at;
    }

    /// Clear the pin state.
    pub fn unpin(&mut self, at: DateTime<Utc>) {
        self.pinned = false;
        self.pinned_by = None;
        self.pinned_at = None;
        self.updated_at = at;
    }

    /// Replace the content and stamp the edit.
    pub fn edit(&mut self, content: String, at: DateTime<Utc>) {
        self.content = content;
        self.edited_at = Some(at);
        self.updated_at = at;
    }

    /// Get the content length in characters.
    pub fn content_length(&self) -> usize {
        self.content.chars().count()
    }
}

impl Default for Message {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            channel_id: 0,
            sender_id: 0,
            content: String::new(),
            thread_id: None,
            reply_to_id: None,
            pinned: false,
            pinned_by: None,
            pinned_at: None,
            mentions: Vec::new(),
            flags: MessageFlags::default(),
            edited_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Search criteria for [`MessageRepository::search`].
///
/// Every `None` field is unconstrained. `limit` and `offset` are applied
/// after filtering; `total` in the result counts all matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    pub channel_id: Option<i64>,
    pub sender_id: Option<i64>,
    /// Case-insensitive substring match on content
    pub query: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub has_attachments: Option<bool>,
    pub has_mentions: Option<bool>,
    pub pinned: Option<bool>,
    pub nsfw: Option<bool>,
    pub spoiler: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub messages: Vec<Message>,
    pub total: i64,
}

/// Repository trait for Message data access operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Find a message by its Snowflake ID.
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError>;

    /// Messages of a channel, newest first.
    async fn find_by_channel(
        &self,
        channel_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, AppError>;

    /// Messages belonging to a thread, oldest first.
    async fn find_by_thread(&self, thread_id: i64) -> Result<Vec<Message>, AppError>;

    /// Messages naming `message_id` as their thread root or reply target.
    async fn find_referencing(&self, message_id: i64) -> Result<Vec<Message>, AppError>;

    /// Pinned messages of a channel, most recently pinned first.
    async fn find_pinned(&self, channel_id: i64) -> Result<Vec<Message>, AppError>;

    async fn search(&self, filter: &MessageFilter) -> Result<SearchPage, AppError>;

    async fn create(&self, message: &Message) -> Result<Message, AppError>;

    /// Persist content, pin state, mentions and flags.
    async fn update(&self, message: &Message) -> Result<Message, AppError>;

    /// Delete a message owned by `sender_id`.
    ///
    /// Returns the deleted row, or `None` when no row matched (missing or not
    /// owned by the sender).
    async fn delete(&self, id: i64, sender_id: i64) -> Result<Option<Message>, AppError>;
}
