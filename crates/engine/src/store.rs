//! Object storage for input datasets and persisted run reports.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use dirsync_core::error::{DirsyncError, Result};

/// Minimal key/value object store. Inputs are fetched by key; run reports
/// are persisted under the result cache's key scheme. Absence is `Ok(None)`,
/// not an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).put(key, bytes).await
    }
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).put(key, bytes).await
    }
}

/// Filesystem-backed object store rooted at a directory. Keys map to
/// relative paths below the root; parent directories are created on write.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(DirsyncError::Storage(format!("invalid object key '{key}'")));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DirsyncError::Storage(format!(
                "read {} failed: {e}",
                path.display()
            ))),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DirsyncError::Storage(format!("mkdir {} failed: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            DirsyncError::Storage(format!("write {} failed: {e}", path.display()))
        })
    }
}
