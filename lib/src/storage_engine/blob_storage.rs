// lib/src/storage_engine/blob_storage.rs

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::fs;

use super::storage_engine::BlobStorage;
use crate::errors::{StoreError, StoreResult};

/// Stores blobs as plain files under `<root>/<owner>/<filename>`.
#[derive(Debug, Clone)]
pub struct DiskBlobStorage {
    root: PathBuf,
}

impl DiskBlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DiskBlobStorage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rejects anything that is not a single plain path segment so a crafted
    /// name cannot escape the owner directory.
    fn segment(name: &str) -> StoreResult<&str> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(name),
            _ => Err(StoreError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid blob path segment: {:?}", name),
            ))),
        }
    }

    fn blob_path(&self, owner: &str, filename: &str) -> StoreResult<PathBuf> {
        Ok(self.root.join(Self::segment(owner)?).join(Self::segment(filename)?))
    }
}

#[async_trait]
impl BlobStorage for DiskBlobStorage {
    async fn put_blob(&self, owner: &str, filename: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.blob_path(owner, filename)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        debug!("Wrote {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }

    async fn get_blob(&self, owner: &str, filename: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.blob_path(owner, filename)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_blob(&self, owner: &str, filename: &str) -> StoreResult<()> {
        let path = self.blob_path(owner, filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Blob {:?} was already gone", path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
