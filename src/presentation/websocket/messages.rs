//! Realtime Wire Formats
//!
//! Every frame is a JSON text frame with a `type` discriminator:
//!
//! - channel broadcast: `{type, channelId, data, timestamp}`
//! - presence / typing / read receipt: `{type, data}`
//! - error: `{type: "error", code, message}`
//! - heartbeat: `{type: "ping"}` / `{type: "pong"}`

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::PresenceStatus;
use crate::shared::error::AppError;

/// A serialized outbound frame, shared between every recipient of a fan-out.
pub type Frame = Arc<str>;

/// Serialize any envelope into a [`Frame`].
pub fn encode<T: Serialize>(envelope: &T) -> Result<Frame, serde_json::Error> {
    serde_json::to_string(envelope).map(Frame::from)
}

/// Message scoped to one channel's subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub event_type: String,
    pub channel_id: i64,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl BroadcastMessage {
    pub fn new(event_type: impl Into<String>, channel_id: i64, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            channel_id,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Compact `{type, data}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(event_type: impl Into<String>, data: T) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub code: u16,
    pub message: String,
}

impl From<&AppError> for ErrorFrame {
    fn from(err: &AppError) -> Self {
        Self {
            frame_type: "error".into(),
            code: err.code(),
            message: err.public_message(),
        }
    }
}

/// Heartbeat frames in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Heartbeat {
    Ping,
    Pong,
}

/// Typing indicator relayed to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub channel_id: i64,
    pub user_id: i64,
    pub typing: bool,
}

/// Client-originated read marker relayed to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptEvent {
    pub channel_id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRef {
    pub channel_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub channel_id: i64,
    #[serde(default = "default_typing")]
    pub typing: bool,
}

fn default_typing() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptPayload {
    pub channel_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PresencePayload {
    pub status: PresenceStatus,
}

/// Inbound frame from a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe(ChannelRef),
    Unsubscribe(ChannelRef),
    Typing(TypingPayload),
    ReadReceipt(ReadReceiptPayload),
    Presence(PresencePayload),
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_client_frames_decode() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe","data":{"channelId":7}}"#).unwrap();
        assert_eq!(frame, ClientFrame::Subscribe(ChannelRef { channel_id: 7 }));

        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"typing","data":{"channelId":7}}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Typing(TypingPayload {
                channel_id: 7,
                typing: true
            })
        );

        let frame: ClientFrame = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Pong);

        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"presence","data":{"status":"offline"}}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Presence(PresencePayload {
                status: PresenceStatus::Offline
            })
        );
    }

    #[test]
    fn test_unknown_frame_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"shout","data":{}}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
    }

    #[test]
    fn test_broadcast_envelope_shape() {
        let msg = BroadcastMessage::new("message_created", 7, json!({"id": 1}));
        let value: Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();

        assert_eq!(value["type"], "message_created");
        assert_eq!(value["channelId"], 7);
        assert_eq!(value["data"]["id"], 1);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_error_and_heartbeat_frames() {
        let err = ErrorFrame::from(&AppError::Validation("bad frame".into()));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"type": "error", "code": 10007, "message": "Validation error: bad frame"})
        );
        assert_eq!(encode(&Heartbeat::Ping).unwrap().as_ref(), r#"{"type":"ping"}"#);
    }
}
