//! # Domain Entities
//!
//! Core domain entities of the chat hub. Each persistent entity has an
//! associated repository trait defining its data access contract; the
//! traits are implemented in the infrastructure layer (PostgreSQL, in
//! memory, and the cache-aside decorators).
//!
//! - **Channel**: a conversation space with members and a pinned index
//! - **Message**: a text message, optionally threaded, pinned, flagged
//! - **Attachment**: a stored file owned by a message
//! - **Reaction**: an emoji reaction on a message
//! - **ReadReceipt**: a user's read marker on a message
//! - **PresenceRecord**: last known online/offline state of a user

mod attachment;
mod channel;
mod message;
mod presence;
mod reaction;
mod read_receipt;

pub use attachment::{
    file_extension, is_allowed_extension, is_image, Attachment, AttachmentRepository,
    ALLOWED_EXTENSIONS, MAX_ATTACHMENT_SIZE,
};
pub use channel::{Channel, ChannelRepository, MAX_PINNED_MESSAGES};
pub use message::{
    Message, MessageFilter, MessageFlags, MessageRepository, SearchPage, MAX_CONTENT_LENGTH,
};
pub use presence::{PresenceRecord, PresenceStatus};
pub use reaction::{summarize, Reaction, ReactionCount, ReactionRepository};
pub use read_receipt::{ReadReceipt, ReadReceiptRepository};

#[cfg(test)]
pub use message::MockMessageRepository;
