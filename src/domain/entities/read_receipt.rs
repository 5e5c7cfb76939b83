//! Read receipt entity and repository trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Records that a user has read a message.
///
/// Never created for the message's own sender; at most one per
/// (message_id, user_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: i64,
    pub user_id: i64,
    pub read_at: DateTime<Utc>,
}

#[async_trait]
pub trait ReadReceiptRepository: Send + Sync {
    /// Insert the receipt unless one already exists for the same
    /// (message, user). Returns true when a row was created.
    async fn create_if_absent(&self, receipt: &ReadReceipt) -> Result<bool, AppError>;

    async fn find_by_message(&self, message_id: i64) -> Result<Vec<ReadReceipt>, AppError>;

    /// Create receipts for every message in the channel not sent by
    /// `user_id` and not already read by them. Returns the number created.
    async fn mark_channel_read(
        &self,
        channel_id: i64,
        user_id: i64,
        read_at: DateTime<Utc>,
    ) -> Result<u64, AppError>;
}
