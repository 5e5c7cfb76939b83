//! Application settings and configuration structures.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Redis configuration
    pub redis: RedisSettings,

    /// Handshake token validation
    pub jwt: JwtSettings,

    /// Snowflake ID generator settings
    pub snowflake: SnowflakeSettings,

    /// Realtime gateway configuration
    pub websocket: WebSocketSettings,

    /// Cache-aside TTLs and key namespace
    pub cache: CacheSettings,

    /// Attachment file storage
    pub storage: StorageSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

/// JWT validation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key the tokens were signed with
    pub secret: String,
}

/// Snowflake ID generator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeSettings {
    /// Machine/worker ID (0-31)
    pub machine_id: u16,

    /// Custom epoch timestamp in milliseconds
    pub epoch: u64,
}

/// Realtime gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Capacity of each client's outbound buffer; a full buffer evicts the client
    pub client_buffer_size: usize,

    /// Interval between heartbeat pings in milliseconds
    pub heartbeat_interval_ms: u64,

    /// Window without a heartbeat response before the connection is dropped
    pub idle_timeout_ms: u64,

    /// Maximum inbound message size in bytes
    pub max_message_size: usize,
}

impl WebSocketSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            client_buffer_size: 256,
            heartbeat_interval_ms: 30_000,
            idle_timeout_ms: 75_000,
            max_message_size: 65_536,
        }
    }
}

/// Cache-aside configuration. All TTLs are in seconds.
///
/// Volatile derived collections get short TTLs; long-lived entities get
/// long ones.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Prefix prepended to every key (namespacing per deployment)
    #[serde(default)]
    pub key_prefix: Option<String>,
    pub channel_ttl: u64,
    pub message_ttl: u64,
    pub attachment_ttl: u64,
    pub channel_members_ttl: u64,
    pub user_channels_ttl: u64,
    pub channel_pinned_ttl: u64,
    pub channel_messages_ttl: u64,
    pub message_reactions_ttl: u64,
    pub thread_messages_ttl: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            key_prefix: None,
            channel_ttl: 3600,
            message_ttl: 1800,
            attachment_ttl: 3600,
            channel_members_ttl: 900,
            user_channels_ttl: 900,
            channel_pinned_ttl: 600,
            channel_messages_ttl: 300,
            message_reactions_ttl: 300,
            thread_messages_ttl: 120,
        }
    }
}

/// Local attachment storage.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Directory uploaded files are written to
    pub root: String,

    /// Base URL files are served from
    pub public_url: String,
}

/// Minimum required length for JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. built-in defaults
    /// 2. config/default.toml
    /// 3. config/{RUN_ENV}.toml
    /// 4. `APP__`-prefixed environment variables
    /// 5. plain overrides (`DATABASE_URL`, `REDIS_URL`, `JWT_SECRET`, ...)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if the JWT secret is too short.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());
        let ws = WebSocketSettings::default();
        let cache = CacheSettings::default();

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("snowflake.machine_id", 1)?
            .set_default("snowflake.epoch", 1420070400000_u64)?
            .set_default("websocket.client_buffer_size", ws.client_buffer_size as u64)?
            .set_default("websocket.heartbeat_interval_ms", ws.heartbeat_interval_ms)?
            .set_default("websocket.idle_timeout_ms", ws.idle_timeout_ms)?
            .set_default("websocket.max_message_size", ws.max_message_size as u64)?
            .set_default("cache.channel_ttl", cache.channel_ttl)?
            .set_default("cache.message_ttl", cache.message_ttl)?
            .set_default("cache.attachment_ttl", cache.attachment_ttl)?
            .set_default("cache.channel_members_ttl", cache.channel_members_ttl)?
            .set_default("cache.user_channels_ttl", cache.user_channels_ttl)?
            .set_default("cache.channel_pinned_ttl", cache.channel_pinned_ttl)?
            .set_default("cache.channel_messages_ttl", cache.channel_messages_ttl)?
            .set_default("cache.message_reactions_ttl", cache.message_reactions_ttl)?
            .set_default("cache.thread_messages_ttl", cache.thread_messages_ttl)?
            .set_default("storage.root", "./data/uploads")?
            .set_default("storage.public_url", "http://localhost:3000/files")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__SERVER__PORT=3000 -> server.port = 3000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option(
                "snowflake.machine_id",
                std::env::var("SNOWFLAKE_MACHINE_ID").ok(),
            )?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                settings.validate()?;
                Ok(settings)
            })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least {} characters. Current length: {}",
                MIN_JWT_SECRET_LENGTH,
                self.jwt.secret.len()
            )));
        }
        if self.websocket.client_buffer_size == 0 {
            return Err(ConfigError::Message(
                "websocket.client_buffer_size must be greater than zero".into(),
            ));
        }
        if self.websocket.idle_timeout_ms <= self.websocket.heartbeat_interval_ms {
            return Err(ConfigError::Message(
                "websocket.idle_timeout_ms must exceed websocket.heartbeat_interval_ms".into(),
            ));
        }
        Ok(())
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
