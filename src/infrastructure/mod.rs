//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Durable repositories (PostgreSQL, in memory)
//! - Cache-aside decorators and cache stores (Redis, in memory)
//! - Attachment file storage
//! - Prometheus metrics

pub mod cache;
pub mod database;
pub mod metrics;
pub mod repositories;
pub mod storage;
