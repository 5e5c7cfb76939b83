//! Realtime Gateway
//!
//! The [`Hub`] fans channel events out to connected clients; each physical
//! connection is driven by a [`Connection`] over a [`FrameSink`] /
//! [`FrameStream`] pair.

pub mod client;
pub mod connection;
pub mod handler;
pub mod hub;
pub mod messages;
pub mod transport;

pub use client::{ClientHandle, ClientId, ConnectionInfo};
pub use connection::{Connection, ConnectionConfig, DisconnectReason};
pub use handler::{validate_token, ws_handler};
pub use hub::{DeliveryReport, Hub};
pub use messages::{BroadcastMessage, ClientFrame, Frame, ReadReceiptEvent, TypingEvent};
pub use transport::{
    channel_transport, ChannelSink, ChannelStream, FrameSink, FrameStream, RemotePeer,
    TransportError, WireFrame,
};
