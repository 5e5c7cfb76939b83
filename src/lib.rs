//! # Chat Hub Library
//!
//! Realtime chat messaging fanned out to connected clients by channel:
//! - A Hub with bounded per-client buffers and eviction on overflow
//! - A WebSocket connection gateway with heartbeats and idle timeouts
//! - Use-case services that validate, persist and dispatch domain events
//! - Cache-aside repositories in front of PostgreSQL, backed by Redis
//!
//! ## Module Structure
//!
//! ```text
//! chat_hub/
//! +-- config/         Configuration management
//! +-- domain/         Entities, repository traits, domain events
//! +-- application/    Use-case services and the event dispatcher
//! +-- infrastructure/ PostgreSQL, Redis cache, file storage, metrics
//! +-- presentation/   Hub, connection gateway, HTTP routes
//! +-- shared/         Errors, Snowflake IDs, validation helpers
//! ```

// Configuration module
pub mod config;

// Domain layer - entities and repository contracts
pub mod domain;

// Application layer - use cases and event dispatch
pub mod application;

// Infrastructure layer - external implementations
pub mod infrastructure;

// Presentation layer - realtime gateway and HTTP
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
