//! Domain events emitted by the use-case layer.
//!
//! Events carry the full state needed by realtime subscribers so the Hub
//! never has to go back to a repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entities::{Attachment, Message, Reaction};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreated {
    pub message: Message,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub message_id: i64,
    pub channel_id: i64,
    pub thread_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRead {
    pub channel_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRead {
    pub channel_id: i64,
    pub user_id: i64,
    pub read_at: DateTime<Utc>,
    /// Number of receipts created by the bulk mark
    pub marked: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionChanged {
    pub channel_id: i64,
    pub reaction: Reaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentUploaded {
    pub channel_id: i64,
    pub attachment: Attachment,
}

/// Every event the use-case layer dispatches.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    MessageCreated(MessageCreated),
    MessageUpdated(Message),
    MessageDeleted(MessageDeleted),
    MessagePinned(Message),
    MessageUnpinned(Message),
    MessageRead(MessageRead),
    ChannelRead(ChannelRead),
    ReactionAdded(ReactionChanged),
    ReactionRemoved(ReactionChanged),
    AttachmentUploaded(AttachmentUploaded),
}

impl ChatEvent {
    /// Wire name of the event (`type` field of the envelope).
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::MessageCreated(_) => "message_created",
            ChatEvent::MessageUpdated(_) => "message_updated",
            ChatEvent::MessageDeleted(_) => "message_deleted",
            ChatEvent::MessagePinned(_) => "message_pinned",
            ChatEvent::MessageUnpinned(_) => "message_unpinned",
            ChatEvent::MessageRead(_) => "message_read",
            ChatEvent::ChannelRead(_) => "channel_read",
            ChatEvent::ReactionAdded(_) => "reaction_added",
            ChatEvent::ReactionRemoved(_) => "reaction_removed",
            ChatEvent::AttachmentUploaded(_) => "attachment_uploaded",
        }
    }

    /// Channel the event is scoped to.
    pub fn channel_id(&self) -> i64 {
        match self {
            ChatEvent::MessageCreated(e) => e.message.channel_id,
            ChatEvent::MessageUpdated(m)
            | ChatEvent::MessagePinned(m)
            | ChatEvent::MessageUnpinned(m) => m.channel_id,
            ChatEvent::MessageDeleted(e) => e.channel_id,
            ChatEvent::MessageRead(e) => e.channel_id,
            ChatEvent::ChannelRead(e) => e.channel_id,
            ChatEvent::ReactionAdded(e) | ChatEvent::ReactionRemoved(e) => e.channel_id,
            ChatEvent::AttachmentUploaded(e) => e.channel_id,
        }
    }

    /// Read-receipt style events use the compact `{type, data}` envelope.
    pub fn is_read_receipt(&self) -> bool {
        matches!(self, ChatEvent::MessageRead(_) | ChatEvent::ChannelRead(_))
    }

    /// JSON payload placed in the envelope's `data` field.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            ChatEvent::MessageCreated(e) => serde_json::to_value(e),
            ChatEvent::MessageUpdated(m)
            | ChatEvent::MessagePinned(m)
            | ChatEvent::MessageUnpinned(m) => serde_json::to_value(m),
            ChatEvent::MessageDeleted(e) => serde_json::to_value(e),
            ChatEvent::MessageRead(e) => serde_json::to_value(e),
            ChatEvent::ChannelRead(e) => serde_json::to_value(e),
            ChatEvent::ReactionAdded(e) | ChatEvent::ReactionRemoved(e) => serde_json::to_value(e),
            ChatEvent::AttachmentUploaded(e) => serde_json::to_value(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_routing_fields() {
        let event = ChatEvent::MessageDeleted(MessageDeleted {
            message_id: 5,
            channel_id: 7,
            thread_id: None,
        });
        assert_eq!(event.event_type(), "message_deleted");
        assert_eq!(event.channel_id(), 7);
        assert!(!event.is_read_receipt());

        let payload = event.payload().unwrap();
        assert_eq!(payload["messageId"], 5);
        assert_eq!(payload["channelId"], 7);
    }
}
