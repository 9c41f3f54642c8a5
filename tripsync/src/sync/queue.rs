use std::collections::HashMap;
use std::path::PathBuf;

use super::paths::FileIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    Sync,
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPayload {
    /// Where a freshly captured file already lives locally, if that differs from the resolved
    /// path.
    pub known_local: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTask {
    pub identity: FileIdentity,
    pub action: SyncAction,
    pub payload: TaskPayload,
}

impl SyncTask {
    pub fn new(identity: FileIdentity, action: SyncAction) -> Self {
        Self {
            identity,
            action,
            payload: TaskPayload::default(),
        }
    }

    pub fn with_known_local(mut self, path: impl Into<PathBuf>) -> Self {
        self.payload.known_local = Some(path.into());
        self
    }
}

/// Pending work keyed by identity. At most one task per identity: the first enqueue wins until
/// that task is dequeued.
#[derive(Debug, Default)]
pub struct SyncQueue {
    inner: HashMap<FileIdentity, SyncTask>,
}

impl SyncQueue {
    /// Returns `false` when a task for the identity is already pending.
    pub fn enqueue(&mut self, task: SyncTask) -> bool {
        if self.inner.contains_key(&task.identity) {
            return false;
        }
        self.inner.insert(task.identity.clone(), task);
        true
    }

    pub fn dequeue(&mut self, identity: &FileIdentity) -> Option<SyncTask> {
        self.inner.remove(identity)
    }

    /// Up to `max` pending tasks, left in place. Order is unspecified.
    pub fn peek_batch(&self, max: usize) -> Vec<SyncTask> {
        self.inner.values().take(max).cloned().collect()
    }

    pub fn contains(&self, identity: &FileIdentity) -> bool {
        self.inner.contains_key(identity)
    }

    pub fn get(&self, identity: &FileIdentity) -> Option<&SyncTask> {
        self.inner.get(identity)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
