//! Frame Transport
//!
//! The gateway talks to a connection through two capabilities: a
//! [`FrameSink`] it writes to and a [`FrameStream`] it reads from. The axum
//! WebSocket halves implement both; [`channel_transport`] provides an
//! in-process pair for driving a connection without a socket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

/// Transport-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Transport error: {0}")]
    Io(String),
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: WireFrame) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait FrameStream: Send {
    /// Next inbound frame; `None` once the peer is gone.
    async fn next_frame(&mut self) -> Option<Result<WireFrame, TransportError>>;
}

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_frame(&mut self, frame: WireFrame) -> Result<(), TransportError> {
        let message = match frame {
            WireFrame::Text(text) => Message::Text(text.into()),
            WireFrame::Binary(data) => Message::Binary(data.into()),
            WireFrame::Ping(data) => Message::Ping(data.into()),
            WireFrame::Pong(data) => Message::Pong(data.into()),
            WireFrame::Close => Message::Close(None),
        };
        self.send(message)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(self)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[async_trait]
impl FrameStream for SplitStream<WebSocket> {
    async fn next_frame(&mut self) -> Option<Result<WireFrame, TransportError>> {
        let message = match self.next().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
        };
        Some(Ok(match message {
            Message::Text(text) => WireFrame::Text(text.as_str().to_owned()),
            Message::Binary(data) => WireFrame::Binary(data.to_vec()),
            Message::Ping(data) => WireFrame::Ping(data.to_vec()),
            Message::Pong(data) => WireFrame::Pong(data.to_vec()),
            Message::Close(_) => WireFrame::Close,
        }))
    }
}

/// Writing half of an in-process transport.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<WireFrame>,
}

/// Reading half of an in-process transport.
#[derive(Debug)]
pub struct ChannelStream {
    rx: mpsc::Receiver<Result<WireFrame, TransportError>>,
}

/// The peer's view of an in-process transport.
#[derive(Debug)]
pub struct RemotePeer {
    /// Frames the peer sends to the connection
    pub outgoing: mpsc::Sender<Result<WireFrame, TransportError>>,
    /// Frames the connection wrote to the peer
    pub incoming: mpsc::Receiver<WireFrame>,
}

impl RemotePeer {
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.outgoing
            .send(Ok(WireFrame::Text(text.into())))
            .await
            .is_ok()
    }

    /// Next text frame written by the connection, skipping control frames.
    pub async fn recv_text(&mut self) -> Option<String> {
        while let Some(frame) = self.incoming.recv().await {
            if let WireFrame::Text(text) = frame {
                return Some(text);
            }
        }
        None
    }
}

/// Create a connected sink/stream pair plus the remote peer driving it.
pub fn channel_transport(capacity: usize) -> (ChannelSink, ChannelStream, RemotePeer) {
    let (to_peer, incoming) = mpsc::channel(capacity.max(1));
    let (outgoing, from_peer) = mpsc::channel(capacity.max(1));
    (
        ChannelSink { tx: to_peer },
        ChannelStream { rx: from_peer },
        RemotePeer { outgoing, incoming },
    )
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_frame(&mut self, frame: WireFrame) -> Result<(), TransportError> {
        self.tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // The peer sees the close frame; a vanished peer is already closed.
        let _ = self.tx.send(WireFrame::Close).await;
        Ok(())
    }
}

#[async_trait]
impl FrameStream for ChannelStream {
    async fn next_frame(&mut self) -> Option<Result<WireFrame, TransportError>> {
        self.rx.recv().await
    }
}
