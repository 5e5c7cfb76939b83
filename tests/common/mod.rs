//! Common Test Utilities
//!
//! A fully wired hub over in-memory collaborators: in-memory durable store,
//! in-memory cache, local file storage in a scratch directory.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use chat_hub::application::events::InMemoryEventDispatcher;
use chat_hub::application::services::{Repositories, SendMessageInput};
use chat_hub::config::{CacheSettings, StorageSettings};
use chat_hub::domain::{Channel, Message};
use chat_hub::infrastructure::cache::MemoryCache;
use chat_hub::infrastructure::repositories::InMemoryStore;
use chat_hub::infrastructure::storage::LocalFileStorage;
use chat_hub::presentation::websocket::{ClientHandle, ClientId, ConnectionInfo, Frame, Hub};
use chat_hub::shared::snowflake::SnowflakeGenerator;
use chat_hub::startup::{cached_repositories, Services};

pub struct TestHub {
    pub durable: Arc<InMemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub repos: Repositories,
    pub hub: Arc<Hub>,
    pub services: Services,
    pub storage_root: PathBuf,
}

impl TestHub {
    pub async fn new() -> Self {
        let durable = Arc::new(InMemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let repos = cached_repositories(
            Repositories {
                channels: durable.clone(),
                messages: durable.clone(),
                reactions: durable.clone(),
                attachments: durable.clone(),
                receipts: durable.clone(),
            },
            cache.clone(),
            &CacheSettings::default(),
        );

        let storage_root = std::env::temp_dir().join(format!("chat-hub-{}", uuid::Uuid::new_v4()));
        let storage = LocalFileStorage::new(&StorageSettings {
            root: storage_root.to_string_lossy().into_owned(),
            public_url: "http://files.test".into(),
        })
        .await
        .expect("storage root");

        let hub = Arc::new(Hub::new());
        let dispatcher = Arc::new(InMemoryEventDispatcher::new());
        dispatcher.subscribe(hub.clone());

        let services = Services::new(
            repos.clone(),
            Arc::new(storage),
            dispatcher,
            Arc::new(SnowflakeGenerator::new(1, 1)),
        );

        Self {
            durable,
            cache,
            repos,
            hub,
            services,
            storage_root,
        }
    }

    /// Create a channel owned by `owner` with the given extra members.
    pub async fn channel(&self, id: i64, owner: i64, members: &[i64]) -> Channel {
        let channel = self
            .repos
            .channels
            .create(&Channel::new(id, format!("channel-{}", id), owner))
            .await
            .expect("create channel");
        for member in members {
            self.repos
                .channels
                .add_member(id, *member)
                .await
                .expect("add member");
        }
        channel
    }

    pub async fn send(&self, channel_id: i64, sender_id: i64, content: &str) -> Message {
        self.services
            .messages
            .send_message(SendMessageInput {
                channel_id,
                sender_id,
                content: content.into(),
                ..Default::default()
            })
            .await
            .expect("send message")
    }

    /// Register a client for `user_id`, subscribed to `channels`, with any
    /// presence frames from registration already drained.
    pub fn connect(&self, user_id: i64, channels: &[i64]) -> (ClientId, mpsc::Receiver<Frame>) {
        let (handle, mut rx) = ClientHandle::new(user_id, ConnectionInfo::default(), 64);
        let id = handle.id;
        self.hub.register(handle);
        for channel_id in channels {
            self.hub.subscribe(id, *channel_id);
        }
        drain(&mut rx);
        (id, rx)
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.storage_root);
    }
}

/// Every frame currently queued, decoded.
pub fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).expect("frame is JSON"));
    }
    frames
}

/// `type` of each frame.
pub fn types(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .map(|f| f["type"].as_str().unwrap_or_default().to_string())
        .collect()
}
