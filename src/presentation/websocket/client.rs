//! Connected client handle held by the Hub.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::Frame;

pub type ClientId = Uuid;

/// Metadata captured at handshake time.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub remote_addr: Option<SocketAddr>,
    pub user_agent: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(remote_addr: Option<SocketAddr>, user_agent: Option<String>) -> Self {
        Self {
            remote_addr,
            user_agent,
            connected_at: Utc::now(),
        }
    }
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Sending half of a client's bounded outbound buffer.
///
/// The Hub owns the only handle; dropping it closes the buffer, which the
/// connection's writer observes as eviction.
#[derive(Debug)]
pub struct ClientHandle {
    pub id: ClientId,
    pub user_id: i64,
    pub info: ConnectionInfo,
    pub(crate) sender: mpsc::Sender<Frame>,
}

impl ClientHandle {
    /// Create a handle plus the receiving end of its outbound buffer.
    pub fn new(
        user_id: i64,
        info: ConnectionInfo,
        buffer_size: usize,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            user_id,
            info,
            sender,
        };
        (handle, receiver)
    }
}
