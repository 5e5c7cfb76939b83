//! Channel entity and repository trait.
//!
//! Maps to the `channels`, `channel_members` and `channel_pins` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Maximum number of pinned messages per channel.
pub const MAX_PINNED_MESSAGES: usize = 50;

/// A chat channel.
///
/// Membership and the pinned-message index live in their own tables and are
/// reached through [`ChannelRepository`], so they can be cached under their
/// own keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Snowflake ID (primary key)
    pub id: i64,

    pub name: String,

    pub description: Option<String>,

    /// User who created the channel
    pub owner_id: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(id: i64, name: impl Into<String>, owner_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: None,
            owner_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_id == user_id
    }
}

/// Repository trait for Channel data access operations.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Channel>, AppError>;

    async fn find_all(&self) -> Result<Vec<Channel>, AppError>;

    /// Channels the user is a member of.
    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Channel>, AppError>;

    /// Create a channel; the owner becomes its first member.
    async fn create(&self, channel: &Channel) -> Result<Channel, AppError>;

    async fn update(&self, channel: &Channel) -> Result<Channel, AppError>;

    /// Delete a channel owned by `owner_id`. `None` when nothing matched.
    async fn delete(&self, id: i64, owner_id: i64) -> Result<Option<Channel>, AppError>;

    async fn members(&self, channel_id: i64) -> Result<Vec<i64>, AppError>;

    async fn is_member(&self, channel_id: i64, user_id: i64) -> Result<bool, AppError>;

    async fn add_member(&self, channel_id: i64, user_id: i64) -> Result<(), AppError>;

    /// Returns false when the user was not a member.
    async fn remove_member(&self, channel_id: i64, user_id: i64) -> Result<bool, AppError>;

    /// IDs in the channel's pinned index, most recently pinned first.
    async fn pinned_message_ids(&self, channel_id: i64) -> Result<Vec<i64>, AppError>;

    /// Add a message to the pinned index unless the index already holds
    /// `limit` entries. Returns false when the cap was hit.
    async fn add_pin(&self, channel_id: i64, message_id: i64, limit: usize)
        -> Result<bool, AppError>;

    async fn remove_pin(&self, channel_id: i64, message_id: i64) -> Result<(), AppError>;
}
