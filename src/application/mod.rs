//! Application Layer
//!
//! Use-case services and the event dispatcher that fans their domain
//! events out to realtime subscribers.

pub mod events;
pub mod services;
