//! Presentation Layer
//!
//! The realtime gateway and the HTTP routes that expose it.

pub mod http;
pub mod middleware;
pub mod websocket;
