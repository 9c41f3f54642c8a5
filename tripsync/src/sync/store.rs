use std::io;
use std::path::Path;

use async_trait::async_trait;
use tripsync_core::{ObjectMetadata, StorageClient, StorageError};

use super::paths::FileIdentity;

/// Remote object storage addressed by identity.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` when the object does not exist; transport and server failures are errors.
    async fn probe(&self, identity: &FileIdentity) -> Result<Option<ObjectMetadata>, StorageError>;
    async fn upload(&self, local: &Path, identity: &FileIdentity) -> Result<(), StorageError>;
    /// Overwrites `local`.
    async fn download(&self, identity: &FileIdentity, local: &Path) -> Result<(), StorageError>;
    async fn delete(&self, identity: &FileIdentity) -> Result<(), StorageError>;
}

/// Local filesystem addressed by absolute path.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn exists(&self, path: &Path) -> io::Result<bool>;
    /// Creates `path` and its parents; succeeds if it already exists.
    async fn ensure_dir(&self, path: &Path) -> io::Result<()>;
    async fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Succeeds when `path` is already absent.
    async fn remove(&self, path: &Path) -> io::Result<()>;
}

#[async_trait]
impl RemoteStore for StorageClient {
    async fn probe(&self, identity: &FileIdentity) -> Result<Option<ObjectMetadata>, StorageError> {
        match self.get_metadata(identity.as_str()).await {
            Ok(meta) => Ok(Some(meta)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn upload(&self, local: &Path, identity: &FileIdentity) -> Result<(), StorageError> {
        self.upload_from_path(identity.as_str(), local).await?;
        Ok(())
    }

    async fn download(&self, identity: &FileIdentity, local: &Path) -> Result<(), StorageError> {
        self.download_to_path(identity.as_str(), local).await
    }

    async fn delete(&self, identity: &FileIdentity) -> Result<(), StorageError> {
        self.delete_object(identity.as_str()).await
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsLocalStore;

#[async_trait]
impl LocalStore for FsLocalStore {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    async fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        match tokio::fs::rename(from, to).await {
            Ok(()) => Ok(()),
            // Camera/picker files often live on another mount than the documents dir.
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                tokio::fs::copy(from, to).await?;
                tokio::fs::remove_file(from).await
            }
            Err(err) => Err(err),
        }
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}
