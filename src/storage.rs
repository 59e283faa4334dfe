//! File storage seam for message attachments.
//!
//! The service only ever speaks to the `FileStore` trait; the default
//! implementation keeps bytes on the local filesystem under a configured
//! root. An object store can be swapped in behind the same interface.

use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::AppError;

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persist `bytes` and return best-effort size. The key must have been
    /// produced by [`new_storage_key`].
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<Option<i64>, AppError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, AppError>;

    /// Best-effort removal; missing files are not an error.
    async fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// Generate a collision-free storage key preserving a readable suffix.
pub fn new_storage_key(original_name: &str) -> String {
    format!("{}_{}", Uuid::new_v4(), sanitize_filename(original_name))
}

/// Strip path separators and control characters so a client-supplied name
/// can never escape the storage root or corrupt headers.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim_matches(['.', ' ']).to_string();
    if trimmed.is_empty() {
        "attachment".to_string()
    } else {
        trimmed
    }
}

pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, AppError> {
        // Keys are generated server-side, but reject anything that could
        // traverse out of the root if a hostile key reaches the database.
        if key.contains("..") || key.contains('/') || key.contains('\\') {
            return Err(AppError::Storage(format!("invalid storage key: {key}")));
        }
        Ok(self.root.join(key))
    }

    async fn ensure_root(&self) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::Storage(format!("create storage root: {e}")))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<Option<i64>, AppError> {
        self.ensure_root().await?;
        let path = self.resolve(key)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Storage(format!("write {}: {e}", path.display())))?;
        Ok(Some(bytes.len() as i64))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::Storage(format!("read {}: {e}", path.display())))
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!(
                "remove {}: {e}",
                path.display()
            ))),
        }
    }
}

impl std::fmt::Debug for LocalFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileStore")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("a\\b\0c"), "a_b_c");
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_filename(""), "attachment");
        assert_eq!(sanitize_filename("..."), "attachment");
    }

    #[test]
    fn storage_keys_are_unique_per_call() {
        let a = new_storage_key("file.txt");
        let b = new_storage_key("file.txt");
        assert_ne!(a, b);
        assert!(a.ends_with("_file.txt"));
    }

    #[tokio::test]
    async fn local_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("atelier_store_{}", Uuid::new_v4()));
        let store = LocalFileStore::new(&dir);
        let key = new_storage_key("hello.txt");
        let size = store.put(&key, b"hello world").await.unwrap();
        assert_eq!(size, Some(11));
        assert_eq!(store.get(&key).await.unwrap(), b"hello world");
        store.remove(&key).await.unwrap();
        assert!(store.get(&key).await.is_err());
        // removing twice is fine
        store.remove(&key).await.unwrap();
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let store = LocalFileStore::new(std::env::temp_dir());
        assert!(store.get("../secret").await.is_err());
        assert!(store.get("a/b").await.is_err());
    }
}
