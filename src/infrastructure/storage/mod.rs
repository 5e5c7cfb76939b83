//! Attachment file storage.
//!
//! Files are addressed by a relative storage path such as
//! `123/6f1c...-a1b2c3d4e5f6.png`. The path scheme itself is produced by
//! [`storage_path`].

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StorageSettings;
use crate::shared::error::AppError;

/// Hex characters of the content digest kept in a storage path.
const DIGEST_PREFIX_LEN: usize = 12;

/// Where attachment bytes live.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store `data` at `path`, returning its public URL.
    async fn upload_file(&self, path: &str, data: &[u8], content_type: &str)
        -> Result<String, AppError>;

    /// Remove the file at `path`. Removing a missing file succeeds.
    async fn delete_file(&self, path: &str) -> Result<(), AppError>;

    fn file_url(&self, path: &str) -> String;
}

/// Collision-resistant storage path: `<message_id>/<uuid>-<sha256 prefix>.<ext>`.
pub fn storage_path(message_id: i64, data: &[u8], ext: &str) -> String {
    let digest = hex::encode(Sha256::digest(data));
    format!(
        "{}/{}-{}.{}",
        message_id,
        Uuid::new_v4(),
        &digest[..DIGEST_PREFIX_LEN],
        ext
    )
}

/// Files on the local filesystem under a root directory.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalFileStorage {
    pub async fn new(settings: &StorageSettings) -> Result<Self, AppError> {
        let root = PathBuf::from(&settings.root);
        fs::create_dir_all(&root)
            .await
            .map_err(|e| AppError::Storage(format!("Cannot create storage root: {}", e)))?;
        info!("File storage directory: {}", root.display());
        Ok(Self {
            root,
            public_url: settings.public_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a relative storage path below the root, refusing anything
    /// that would escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(AppError::Validation(format!("Invalid storage path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn upload_file(
        &self,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, AppError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        }

        let mut file = fs::File::create(&full)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        file.write_all(data)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        info!(path = %path, size = data.len(), content_type = %content_type, "Stored file");
        Ok(self.file_url(path))
    }

    async fn delete_file(&self, path: &str) -> Result<(), AppError> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => {
                info!(path = %path, "Deleted file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path, "File already gone");
                Ok(())
            }
            Err(e) => Err(AppError::Storage(e.to_string())),
        }
    }

    fn file_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_storage() -> LocalFileStorage {
        let root = std::env::temp_dir().join(format!("chat-hub-storage-{}", Uuid::new_v4()));
        LocalFileStorage::new(&StorageSettings {
            root: root.to_string_lossy().into_owned(),
            public_url: "http://localhost/files/".into(),
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_storage_path_shape() {
        let path = storage_path(42, b"hello", "png");
        let (dir, name) = path.split_once('/').unwrap();

        assert_eq!(dir, "42");
        assert!(name.ends_with(".png"));
        // uuid (36) + '-' + digest prefix + ".png"
        assert_eq!(name.len(), 36 + 1 + DIGEST_PREFIX_LEN + 4);
        assert!(name.contains(&hex::encode(Sha256::digest(b"hello"))[..DIGEST_PREFIX_LEN]));
    }

    #[test]
    fn test_same_content_gets_distinct_paths() {
        assert_ne!(storage_path(1, b"x", "txt"), storage_path(1, b"x", "txt"));
    }

    #[tokio::test]
    async fn test_upload_and_delete() {
        let storage = temp_storage().await;
        let url = storage
            .upload_file("9/file.txt", b"contents", "text/plain")
            .await
            .unwrap();

        assert_eq!(url, "http://localhost/files/9/file.txt");
        assert!(storage.root.join("9/file.txt").exists());

        storage.delete_file("9/file.txt").await.unwrap();
        assert!(!storage.root.join("9/file.txt").exists());
        storage.delete_file("9/file.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_escaping_paths_rejected() {
        let storage = temp_storage().await;
        assert!(storage.upload_file("../etc/passwd", b"x", "text/plain").await.is_err());
        assert!(storage.upload_file("/abs", b"x", "text/plain").await.is_err());
    }
}
