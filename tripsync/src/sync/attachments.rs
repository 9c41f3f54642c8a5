use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tripsync_core::StorageError;

use super::engine::EngineError;
use super::paths::{FileIdentity, PathResolver, file_name_from_source};
use super::store::{LocalStore, RemoteStore};

/// Handle of a best-effort remote push. Its outcome is only logged; dropping the handle
/// detaches the task.
pub type DetachedPush = JoinHandle<()>;

/// A remote write on the best-effort path failed. Logged, never returned to callers; the next
/// reconciliation of the identity repeats the work.
#[derive(Debug, Error)]
#[error("best-effort {op} of {identity} failed: {source}")]
pub struct TransientPushError {
    pub op: &'static str,
    pub identity: FileIdentity,
    #[source]
    pub source: StorageError,
}

#[derive(Debug)]
pub struct SavedFile {
    pub identity: FileIdentity,
    pub name: String,
    pub local_path: PathBuf,
    pub push: DetachedPush,
}

/// Local-first attachment storage: local writes are durable before they return, remote writes
/// follow in the background.
#[derive(Clone)]
pub struct AttachmentStore {
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) local: Arc<dyn LocalStore>,
    pub(crate) resolver: PathResolver,
}

impl AttachmentStore {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalStore>,
        resolver: PathResolver,
    ) -> Self {
        Self {
            remote,
            local,
            resolver,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Moves a freshly captured file into local storage under `prefix` and starts uploading it.
    /// Remote failures never fail the save.
    pub async fn save_new_file(
        &self,
        source: &Path,
        prefix: &str,
    ) -> Result<SavedFile, EngineError> {
        let name = file_name_from_source(source)?;
        let identity = FileIdentity::join(prefix, &name)?;
        let destination = self.resolver.resolve(&identity);

        if let Some(parent) = destination.parent() {
            self.local.ensure_dir(parent).await?;
        }
        if source != destination.as_path() {
            self.local.remove(&destination).await?;
            self.local.move_file(source, &destination).await?;
        }
        info!(identity = %identity, path = %destination.display(), "saved new file locally");

        let push = self.spawn_upload(identity.clone(), destination.clone());
        Ok(SavedFile {
            identity,
            name,
            local_path: destination,
            push,
        })
    }

    /// Removes the local copy, then requests remote deletion in the background. Only a local
    /// failure other than absence is an error, and it leaves the remote copy alone.
    pub async fn delete_file(&self, identity: &FileIdentity) -> Result<DetachedPush, EngineError> {
        let path = self.resolver.resolve(identity);
        self.local
            .remove(&path)
            .await
            .map_err(|source| EngineError::Deletion {
                path: path.clone(),
                source,
            })?;
        debug!(identity = %identity, path = %path.display(), "local copy removed");
        Ok(self.spawn_remote_delete(identity.clone()))
    }

    fn spawn_upload(&self, identity: FileIdentity, local: PathBuf) -> DetachedPush {
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            match remote.upload(&local, &identity).await {
                Ok(()) => debug!(identity = %identity, "best-effort upload done"),
                Err(source) => log_push_failure(&TransientPushError {
                    op: "upload",
                    identity,
                    source,
                }),
            }
        })
    }

    fn spawn_remote_delete(&self, identity: FileIdentity) -> DetachedPush {
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            match remote.delete(&identity).await {
                Ok(()) => debug!(identity = %identity, "remote copy deleted"),
                Err(source) if source.is_not_found() => {
                    debug!(identity = %identity, "remote copy already absent");
                }
                Err(source) => log_push_failure(&TransientPushError {
                    op: "delete",
                    identity,
                    source,
                }),
            }
        })
    }
}

fn log_push_failure(err: &TransientPushError) {
    warn!(
        identity = %err.identity,
        op = err.op,
        retryable = err.source.is_retryable(),
        error = %err,
        "remote push failed; left for the next reconciliation"
    );
}
