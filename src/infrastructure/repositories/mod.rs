//! Repository Implementations
//!
//! Durable implementations of the domain repository traits.
//!
//! ## Available Repositories
//!
//! - **PgChannelRepository** - Channels, membership and the pinned index
//! - **PgMessageRepository** - Message CRUD, offset pages, threads, search
//! - **PgReactionRepository** - Message reactions
//! - **PgAttachmentRepository** - Attachment metadata
//! - **PgReadReceiptRepository** - Read receipts and bulk channel reads
//! - **InMemoryStore** - Every trait above, in process
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use crate::infrastructure::repositories::{PgChannelRepository, PgMessageRepository};
//!
//! async fn setup_repositories(pool: PgPool) {
//!     let channel_repo = PgChannelRepository::new(pool.clone());
//!     let message_repo = PgMessageRepository::new(pool.clone());
//! }
//! ```

pub mod attachment_repository;
pub mod channel_repository;
pub mod memory;
pub mod message_repository;
pub mod reaction_repository;
pub mod read_receipt_repository;

pub use attachment_repository::PgAttachmentRepository;
pub use channel_repository::PgChannelRepository;
pub use memory::InMemoryStore;
pub use message_repository::PgMessageRepository;
pub use reaction_repository::PgReactionRepository;
pub use read_receipt_repository::PgReadReceiptRepository;
