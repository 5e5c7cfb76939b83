//! Connection Gateway
//!
//! One [`Connection`] per physical connection. It registers a client with
//! the [`Hub`], then runs a reader and a writer concurrently:
//!
//! ```text
//!  FrameStream --> reader --(subscribe/typing/read/presence)--> Hub
//!                    |                                          |
//!                    +--(pong, transport pong)--> control       | try_send
//!                                                   |           v
//!  FrameSink   <-- writer <-------------------------+---- outbound buffer
//!                    ^
//!                    +-- heartbeat tick (ping / idle check)
//! ```
//!
//! Whichever side finishes first decides the [`DisconnectReason`]; the
//! client is unregistered exactly once afterwards.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::client::{ClientHandle, ClientId, ConnectionInfo};
use super::hub::Hub;
use super::messages::{
    encode, ClientFrame, ErrorFrame, Frame, Heartbeat, ReadReceiptEvent, TypingEvent,
};
use super::transport::{FrameSink, FrameStream, WireFrame};
use crate::config::WebSocketSettings;
use crate::domain::{ChannelRepository, PresenceRecord};
use crate::shared::error::AppError;

/// Capacity of the reader-to-writer control queue.
const CONTROL_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed the connection or the stream ended
    ClientClosed,
    /// The Hub dropped the client's outbound buffer
    Evicted,
    /// The peer sent a frame that could not be decoded
    Malformed,
    WriteFailed,
    /// No heartbeat response within the idle window
    IdleTimeout,
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::Evicted => "evicted",
            Self::Malformed => "malformed",
            Self::WriteFailed => "write_failed",
            Self::IdleTimeout => "idle_timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub buffer_size: usize,
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
    pub max_message_size: usize,
}

impl From<&WebSocketSettings> for ConnectionConfig {
    fn from(settings: &WebSocketSettings) -> Self {
        Self {
            buffer_size: settings.client_buffer_size,
            heartbeat_interval: settings.heartbeat_interval(),
            idle_timeout: settings.idle_timeout(),
            max_message_size: settings.max_message_size,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from(&WebSocketSettings::default())
    }
}

/// How a loop ended, plus an optional last frame for the peer.
struct LoopExit {
    reason: DisconnectReason,
    farewell: Option<Frame>,
}

impl From<DisconnectReason> for LoopExit {
    fn from(reason: DisconnectReason) -> Self {
        Self {
            reason,
            farewell: None,
        }
    }
}

/// One client's connection to the Hub.
pub struct Connection {
    hub: Arc<Hub>,
    channels: Arc<dyn ChannelRepository>,
    client_id: ClientId,
    user_id: i64,
    config: ConnectionConfig,
    started: Instant,
    /// Millis since `started` of the last heartbeat response
    last_heartbeat: AtomicU64,
    unregistered: AtomicBool,
}

impl Connection {
    /// Drive a connection until it ends, returning why it ended.
    #[instrument(skip_all, fields(user_id = user_id))]
    pub async fn serve<S, R>(
        hub: Arc<Hub>,
        channels: Arc<dyn ChannelRepository>,
        user_id: i64,
        info: ConnectionInfo,
        config: ConnectionConfig,
        mut sink: S,
        stream: R,
        shutdown: watch::Receiver<bool>,
    ) -> DisconnectReason
    where
        S: FrameSink,
        R: FrameStream,
    {
        let (handle, outbound) = ClientHandle::new(user_id, info, config.buffer_size);
        let client_id = handle.id;
        hub.register(handle);

        let connection = Connection {
            hub,
            channels,
            client_id,
            user_id,
            config,
            started: Instant::now(),
            last_heartbeat: AtomicU64::new(0),
            unregistered: AtomicBool::new(false),
        };

        let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER);
        let exit = tokio::select! {
            exit = connection.read_loop(stream, control_tx) => exit,
            exit = connection.write_loop(&mut sink, outbound, control_rx) => exit,
            _ = wait_for_shutdown(shutdown) => DisconnectReason::Shutdown.into(),
        };

        connection.unregister();

        if let Some(frame) = exit.farewell {
            if let Err(e) = sink.send_frame(WireFrame::Text(frame.to_string())).await {
                debug!(error = %e, "Failed to send final frame");
            }
        }
        if exit.reason != DisconnectReason::WriteFailed {
            let _ = sink.close().await;
        }

        info!(
            client_id = %client_id,
            reason = exit.reason.as_str(),
            "Connection closed"
        );
        exit.reason
    }

    /// Unregister from the Hub; only the first call has an effect.
    fn unregister(&self) {
        if !self.unregistered.swap(true, Ordering::AcqRel) {
            self.hub.unregister(self.client_id);
        }
    }

    fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last_heartbeat.store(elapsed, Ordering::Release);
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_heartbeat.load(Ordering::Acquire);
        self.started
            .elapsed()
            .saturating_sub(Duration::from_millis(last))
    }

    async fn read_loop<R: FrameStream>(
        &self,
        mut stream: R,
        control: mpsc::Sender<WireFrame>,
    ) -> LoopExit {
        loop {
            let frame = match stream.next_frame().await {
                None | Some(Ok(WireFrame::Close)) => return DisconnectReason::ClientClosed.into(),
                Some(Err(e)) => {
                    debug!(client_id = %self.client_id, error = %e, "Read failed");
                    return DisconnectReason::ClientClosed.into();
                }
                Some(Ok(frame)) => frame,
            };

            match frame {
                WireFrame::Text(text) => {
                    if text.len() > self.config.max_message_size {
                        return self.malformed(format!(
                            "Frame exceeds {} bytes",
                            self.config.max_message_size
                        ));
                    }
                    let frame = match serde_json::from_str::<ClientFrame>(&text) {
                        Ok(frame) => frame,
                        Err(e) => return self.malformed(format!("Malformed frame: {}", e)),
                    };
                    if let Some(reply) = self.apply(frame).await {
                        if control.send(reply).await.is_err() {
                            return DisconnectReason::WriteFailed.into();
                        }
                    }
                }
                WireFrame::Ping(data) => {
                    self.touch();
                    if control.send(WireFrame::Pong(data)).await.is_err() {
                        return DisconnectReason::WriteFailed.into();
                    }
                }
                WireFrame::Pong(_) => self.touch(),
                WireFrame::Binary(_) => {
                    return self.malformed("Binary frames are not supported".into());
                }
                WireFrame::Close => return DisconnectReason::ClientClosed.into(),
            }
        }
    }

    fn malformed(&self, message: String) -> LoopExit {
        warn!(client_id = %self.client_id, %message, "Dropping client after malformed frame");
        let error = AppError::Validation(message);
        LoopExit {
            reason: DisconnectReason::Malformed,
            farewell: encode(&ErrorFrame::from(&error)).ok(),
        }
    }

    /// Act on a decoded client frame, returning an error frame for the peer
    /// when the request is refused.
    async fn apply(&self, frame: ClientFrame) -> Option<WireFrame> {
        match frame {
            ClientFrame::Subscribe(channel) => {
                return self.subscribe(channel.channel_id).await;
            }
            ClientFrame::Unsubscribe(channel) => {
                self.hub.unsubscribe(self.client_id, channel.channel_id);
            }
            ClientFrame::Typing(payload) => {
                if !self.relays_to(payload.channel_id) {
                    return None;
                }
                self.hub.typing(TypingEvent {
                    channel_id: payload.channel_id,
                    user_id: self.user_id,
                    typing: payload.typing,
                });
            }
            ClientFrame::ReadReceipt(payload) => {
                if !self.relays_to(payload.channel_id) {
                    return None;
                }
                self.hub.read_receipt(ReadReceiptEvent {
                    channel_id: payload.channel_id,
                    message_id: payload.message_id,
                    user_id: self.user_id,
                    read_at: Utc::now(),
                });
            }
            ClientFrame::Presence(payload) => {
                self.hub.presence_update(PresenceRecord {
                    user_id: self.user_id,
                    status: payload.status,
                    last_seen: Utc::now(),
                });
            }
            ClientFrame::Pong => self.touch(),
        }
        None
    }

    async fn subscribe(&self, channel_id: i64) -> Option<WireFrame> {
        let refusal = match self.channels.is_member(channel_id, self.user_id).await {
            Ok(true) => {
                self.hub.subscribe(self.client_id, channel_id);
                return None;
            }
            Ok(false) => {
                debug!(
                    client_id = %self.client_id,
                    channel_id,
                    "Subscribe refused for non-member"
                );
                AppError::Unauthorized(format!("Not a member of channel {}", channel_id))
            }
            Err(e) => {
                warn!(
                    client_id = %self.client_id,
                    channel_id,
                    error = %e,
                    "Membership lookup failed"
                );
                e
            }
        };
        encode(&ErrorFrame::from(&refusal))
            .ok()
            .map(|frame| WireFrame::Text(frame.to_string()))
    }

    /// Typing and read receipts only reach channels this client follows.
    fn relays_to(&self, channel_id: i64) -> bool {
        let subscribed = self.hub.is_subscribed(self.client_id, channel_id);
        if !subscribed {
            debug!(
                client_id = %self.client_id,
                channel_id,
                "Dropping frame for unsubscribed channel"
            );
        }
        subscribed
    }

    async fn write_loop<S: FrameSink>(
        &self,
        sink: &mut S,
        mut outbound: mpsc::Receiver<Frame>,
        mut control: mpsc::Receiver<WireFrame>,
    ) -> LoopExit {
        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let frame = tokio::select! {
                next = outbound.recv() => match next {
                    Some(frame) => WireFrame::Text(frame.to_string()),
                    None => return DisconnectReason::Evicted.into(),
                },
                Some(frame) = control.recv() => frame,
                _ = heartbeat.tick() => {
                    if self.idle_for() > self.config.idle_timeout {
                        info!(client_id = %self.client_id, "Heartbeat timeout");
                        return DisconnectReason::IdleTimeout.into();
                    }
                    match encode(&Heartbeat::Ping) {
                        Ok(ping) => WireFrame::Text(ping.to_string()),
                        Err(_) => continue,
                    }
                }
            };

            if let Err(e) = sink.send_frame(frame).await {
                debug!(client_id = %self.client_id, error = %e, "Write failed");
                return DisconnectReason::WriteFailed.into();
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Covers a serve future cancelled mid-flight.
        self.unregister();
    }
}

/// Resolve once the shutdown flag is raised. A dropped sender never fires.
async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
