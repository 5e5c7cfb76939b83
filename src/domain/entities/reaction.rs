//! Message Reaction entity and repository trait.
//!
//! Maps to the `reactions` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Represents a reaction on a message.
///
/// A unique constraint on (message_id, user_id, emoji) ensures one reaction
/// per user per emoji per message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    /// Snowflake ID (primary key)
    pub id: i64,

    pub message_id: i64,

    /// User who added the reaction
    pub user_id: i64,

    /// Emoji identifier (Unicode emoji or custom emoji name)
    pub emoji: String,

    pub created_at: DateTime<Utc>,
}

impl Reaction {
    pub fn new(id: i64, message_id: i64, user_id: i64, emoji: String) -> Self {
        Self {
            id,
            message_id,
            user_id,
            emoji,
            created_at: Utc::now(),
        }
    }
}

/// Aggregated reaction count for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionCount {
    pub emoji: String,
    pub count: i64,
    /// Whether the requesting user reacted with this emoji
    #[serde(default)]
    pub me: bool,
}

/// Group reactions by emoji, preserving first-seen order.
pub fn summarize(reactions: &[Reaction], viewer_id: i64) -> Vec<ReactionCount> {
    let mut counts: Vec<ReactionCount> = Vec::new();
    for reaction in reactions {
        match counts.iter_mut().find(|c| c.emoji == reaction.emoji) {
            Some(entry) => {
                entry.count += 1;
                entry.me |= reaction.user_id == viewer_id;
            }
            None => counts.push(ReactionCount {
                emoji: reaction.emoji.clone(),
                count: 1,
                me: reaction.user_id == viewer_id,
            }),
        }
    }
    counts
}

/// Repository trait for Reaction data access operations.
#[async_trait]
pub trait ReactionRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Reaction>, AppError>;

    /// All reactions on a message, oldest first.
    async fn find_by_message(&self, message_id: i64) -> Result<Vec<Reaction>, AppError>;

    /// Fails with `AppError::Conflict` when the user already reacted with
    /// the same emoji.
    async fn create(&self, reaction: &Reaction) -> Result<Reaction, AppError>;

    /// Delete a reaction added by `user_id`. `None` when nothing matched.
    async fn delete(&self, id: i64, user_id: i64) -> Result<Option<Reaction>, AppError>;
}
