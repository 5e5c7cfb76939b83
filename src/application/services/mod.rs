//! Application Services
//!
//! Use cases that validate input, mutate through the (cached) repositories
//! and dispatch a domain event on success.
//!
//! ## Available Services
//!
//! - **MessageService**: send, edit, delete, channel pages, threads
//! - **PinService**: pin / unpin under the per-channel cap
//! - **ReadReceiptService**: single and bulk read receipts
//! - **SearchService**: filtered message search with paging
//! - **AttachmentService**: validated uploads to file storage
//! - **ReactionService**: emoji reactions

pub mod attachment_service;
pub mod message_service;
pub mod pin_service;
pub mod reaction_service;
pub mod read_receipt_service;
pub mod search_service;

use std::sync::Arc;

use crate::domain::{
    AttachmentRepository, ChannelRepository, MessageRepository, ReactionRepository,
    ReadReceiptRepository,
};

pub use attachment_service::{AttachmentService, AttachmentServiceImpl, UploadAttachmentInput};
pub use message_service::{
    MessagePage, MessageService, MessageServiceImpl, NewAttachment, SendMessageInput,
};
pub use pin_service::{PinService, PinServiceImpl};
pub use reaction_service::{ReactionService, ReactionServiceImpl};
pub use read_receipt_service::{ReadReceiptService, ReadReceiptServiceImpl};
pub use search_service::{has_more, SearchInput, SearchResult, SearchService, SearchServiceImpl};

/// Repository handles shared by the services.
#[derive(Clone)]
pub struct Repositories {
    pub channels: Arc<dyn ChannelRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub reactions: Arc<dyn ReactionRepository>,
    pub attachments: Arc<dyn AttachmentRepository>,
    pub receipts: Arc<dyn ReadReceiptRepository>,
}
