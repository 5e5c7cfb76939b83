//! # Domain Layer
//!
//! Entities, repository contracts and domain events of the chat hub.
//! Independent of storage engines, caches and transports.
//!
//! ## Structure
//!
//! - **entities**: Channel, Message, Attachment, Reaction, ReadReceipt, Presence
//! - **events**: events dispatched by the use-case layer

pub mod entities;
pub mod events;

// Re-export commonly used types
pub use entities::*;
pub use events::ChatEvent;
