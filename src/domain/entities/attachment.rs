//! Message Attachment entity and repository trait.
//!
//! Maps to the `attachments` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Maximum file size in bytes (10MB).
pub const MAX_ATTACHMENT_SIZE: usize = 10 * 1024 * 1024;

/// Extensions accepted for upload (lowercase, without the dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "pdf", "txt", "md", "zip", "mp4", "mp3", "json",
];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Represents a file attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Snowflake ID (primary key)
    pub id: i64,

    /// Message this attachment belongs to
    pub message_id: i64,

    /// Original filename as supplied by the uploader
    pub filename: String,

    /// MIME type (e.g., "image/png", "application/pdf")
    pub content_type: String,

    /// File size in bytes
    pub size: i64,

    /// Public URL of the stored file
    pub url: String,

    pub is_image: bool,

    pub created_at: DateTime<Utc>,
}

impl Attachment {
    /// Get the file extension from the filename.
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.filename)
    }

    /// Get human-readable file size.
    pub fn human_size(&self) -> String {
        let size = self.size as f64;
        if size < 1024.0 {
            format!("{} B", self.size)
        } else if size < 1024.0 * 1024.0 {
            format!("{:.1} KB", size / 1024.0)
        } else {
            format!("{:.1} MB", size / (1024.0 * 1024.0))
        }
    }
}

/// Lowercased extension of `filename`, if it has one.
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_allowed_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&ext)
}

/// Whether a file should be treated as an image, by MIME type or extension.
pub fn is_image(content_type: &str, ext: &str) -> bool {
    content_type.starts_with("image/") || IMAGE_EXTENSIONS.contains(&ext)
}

/// Repository trait for Attachment data access operations.
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Attachment>, AppError>;

    async fn find_by_message(&self, message_id: i64) -> Result<Vec<Attachment>, AppError>;

    async fn create(&self, attachment: &Attachment) -> Result<Attachment, AppError>;

    /// Returns the deleted row, `None` when it did not exist.
    async fn delete(&self, id: i64) -> Result<Option<Attachment>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("photo.PNG", Some("png"))]
    #[test_case("archive.tar.gz", Some("gz"))]
    #[test_case("README", None)]
    #[test_case(".env", None)]
    #[test_case("trailing.", None)]
    fn test_file_extension(name: &str, expected: Option<&str>) {
        assert_eq!(file_extension(name).as_deref(), expected);
    }

    #[test_case("png", true)]
    #[test_case("json", true)]
    #[test_case("exe", false)]
    #[test_case("sh", false)]
    fn test_allow_list(ext: &str, allowed: bool) {
        assert_eq!(is_allowed_extension(ext), allowed);
    }

    #[test]
    fn test_is_image() {
        assert!(is_image("image/png", "png"));
        assert!(is_image("application/octet-stream", "jpg"));
        assert!(!is_image("application/pdf", "pdf"));
    }
}
