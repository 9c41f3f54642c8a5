use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tripsync_core::StorageError;

use super::attachments::{AttachmentStore, DetachedPush, SavedFile};
use super::paths::{FileIdentity, PathError};
use super::queue::{SyncAction, SyncQueue, SyncTask};
use super::reconcile::Reconciliation;
use super::runner::RunnerState;

pub const DEFAULT_BATCH_SIZE: usize = 15;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{identity} is missing both locally and remotely")]
    Integrity { identity: FileIdentity },
    #[error("failed to delete local copy at {}: {source}", path.display())]
    Deletion { path: PathBuf, source: io::Error },
    #[error("storage error: {0}")]
    Remote(#[from] StorageError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("sync task for {identity} did not complete: {source}")]
    TaskAborted {
        identity: FileIdentity,
        source: JoinError,
    },
    #[error("batch driver did not complete: {0}")]
    Driver(#[from] JoinError),
}

pub(crate) struct Shared {
    pub(crate) queue: SyncQueue,
    pub(crate) state: RunnerState,
}

pub(crate) struct EngineInner {
    pub(crate) owner: String,
    pub(crate) store: AttachmentStore,
    pub(crate) batch_size: usize,
    pub(crate) shared: Mutex<Shared>,
}

/// Sync engine for one owner (e.g. one trip): a coalescing work queue drained by a runner that
/// keeps at most one batch in flight. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct SyncEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(store: AttachmentStore) -> Self {
        Self::with_owner("default", store, DEFAULT_BATCH_SIZE)
    }

    pub fn with_owner(owner: impl Into<String>, store: AttachmentStore, batch_size: usize) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                owner: owner.into(),
                store,
                batch_size: batch_size.max(1),
                shared: Mutex::new(Shared {
                    queue: SyncQueue::default(),
                    state: RunnerState::Idle,
                }),
            }),
        }
    }

    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn batch_size(&self) -> usize {
        self.inner.batch_size
    }

    pub fn store(&self) -> &AttachmentStore {
        &self.inner.store
    }

    /// Returns `false` when the identity already has a pending task.
    pub async fn enqueue(&self, task: SyncTask) -> bool {
        self.inner.shared.lock().await.queue.enqueue(task)
    }

    /// Queues `action` for every identity; returns how many were newly queued.
    pub async fn enqueue_files<I>(&self, identities: I, action: SyncAction) -> usize
    where
        I: IntoIterator<Item = FileIdentity>,
    {
        let mut shared = self.inner.shared.lock().await;
        identities
            .into_iter()
            .filter(|identity| shared.queue.enqueue(SyncTask::new(identity.clone(), action)))
            .count()
    }

    pub async fn pending(&self) -> usize {
        self.inner.shared.lock().await.queue.len()
    }

    pub async fn is_pending(&self, identity: &FileIdentity) -> bool {
        self.inner.shared.lock().await.queue.contains(identity)
    }

    pub async fn state(&self) -> RunnerState {
        self.inner.shared.lock().await.state.clone()
    }

    pub async fn reconcile(&self, identity: &FileIdentity) -> Result<Reconciliation, EngineError> {
        self.inner.store.reconcile(identity, None).await
    }

    pub async fn save_new_file(
        &self,
        source: &Path,
        prefix: &str,
    ) -> Result<SavedFile, EngineError> {
        self.inner.store.save_new_file(source, prefix).await
    }

    pub async fn delete_file(&self, identity: &FileIdentity) -> Result<DetachedPush, EngineError> {
        self.inner.store.delete_file(identity).await
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
