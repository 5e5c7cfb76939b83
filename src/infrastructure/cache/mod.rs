//! Cache Module
//!
//! Cache-aside layer between the use cases and the durable store.
//!
//! This module provides:
//! - A byte-oriented `CacheStore` trait with Redis and in-memory backends
//! - `CacheAside`, the fail-open read-through / best-effort invalidation helper
//! - One cached decorator per repository trait
//! - Deterministic key builders (`keys`)
//!
//! # Architecture
//!
//! ```text
//! +-------------------------+
//! |   Use-case services     |
//! +-------------------------+
//!            |
//!            v
//! +-------------------------+        +------------------+
//! | Cached*Repository       | -----> |   CacheStore     |  Redis / memory
//! +-------------------------+        +------------------+
//!            | (miss, write)
//!            v
//! +-------------------------+
//! | Durable repository      |  PostgreSQL / memory
//! +-------------------------+
//! ```
//!
//! Writes go to the durable store first; only a confirmed write
//! invalidates the entity key and every derived collection key.

mod cache_aside;
mod cache_service;
mod cached_attachment_repository;
mod cached_channel_repository;
mod cached_message_repository;
mod cached_reaction_repository;
mod memory_cache;

pub use cache_aside::CacheAside;
pub use cache_service::{CacheError, CacheStore, RedisCache};
pub use cached_attachment_repository::CachedAttachmentRepository;
pub use cached_channel_repository::CachedChannelRepository;
pub use cached_message_repository::CachedMessageRepository;
pub use cached_reaction_repository::CachedReactionRepository;
pub use memory_cache::MemoryCache;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::{CacheSettings, RedisSettings};

/// Creates a Redis connection manager with automatic reconnection.
#[instrument(skip(settings), fields(url = %settings.url))]
pub async fn create_redis_client(
    settings: &RedisSettings,
) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}

/// Creates a `RedisCache` honoring the configured key prefix.
pub async fn create_redis_cache(
    redis: &RedisSettings,
    cache: &CacheSettings,
) -> Result<RedisCache, redis::RedisError> {
    let conn = create_redis_client(redis).await?;
    Ok(match cache.key_prefix.as_deref() {
        Some(prefix) if !prefix.is_empty() => RedisCache::with_prefix(conn, prefix),
        _ => RedisCache::new(conn),
    })
}

/// Cache key builders.
///
/// Use these to ensure consistent key naming across the application.
///
/// ```rust,ignore
/// use chat_hub::infrastructure::cache::keys;
///
/// assert_eq!(keys::channel_members(7), "channel:7:members");
/// ```
pub mod keys {
    use std::fmt::Display;

    /// `channel:<id>`
    #[inline]
    pub fn channel(channel_id: impl Display) -> String {
        format!("channel:{}", channel_id)
    }

    /// `channel:<id>:messages`, the base of every message page key
    #[inline]
    pub fn channel_messages(channel_id: impl Display) -> String {
        format!("channel:{}:messages", channel_id)
    }

    /// One page of a channel's messages
    #[inline]
    pub fn channel_messages_page(channel_id: impl Display, offset: i64, limit: i64) -> String {
        format!("channel:{}:messages:{}:{}", channel_id, offset, limit)
    }

    /// Pattern matching every page of a channel's messages
    #[inline]
    pub fn channel_messages_pattern(channel_id: impl Display) -> String {
        format!("channel:{}:messages*", channel_id)
    }

    /// `channel:<id>:members`
    #[inline]
    pub fn channel_members(channel_id: impl Display) -> String {
        format!("channel:{}:members", channel_id)
    }

    /// `channel:<id>:pinned`
    #[inline]
    pub fn channel_pinned(channel_id: impl Display) -> String {
        format!("channel:{}:pinned", channel_id)
    }

    /// `message:<id>`
    #[inline]
    pub fn message(message_id: impl Display) -> String {
        format!("message:{}", message_id)
    }

    /// `message:<id>:reactions`
    #[inline]
    pub fn message_reactions(message_id: impl Display) -> String {
        format!("message:{}:reactions", message_id)
    }

    /// `message:<id>:attachments`
    #[inline]
    pub fn message_attachments(message_id: impl Display) -> String {
        format!("message:{}:attachments", message_id)
    }

    /// `attachment:<id>`
    #[inline]
    pub fn attachment(attachment_id: impl Display) -> String {
        format!("attachment:{}", attachment_id)
    }

    /// `thread:<id>:messages`
    #[inline]
    pub fn thread_messages(thread_id: impl Display) -> String {
        format!("thread:{}:messages", thread_id)
    }

    /// `user:<id>:channels`
    #[inline]
    pub fn user_channels(user_id: impl Display) -> String {
        format!("user:{}:channels", user_id)
    }

    /// Pattern matching every user's channel list
    pub const ALL_USER_CHANNELS: &str = "user:*:channels";

}
