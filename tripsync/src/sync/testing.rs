use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tripsync_core::{ObjectMetadata, StatusCode, StorageError};

use super::attachments::AttachmentStore;
use super::engine::SyncEngine;
use super::paths::{FileIdentity, PathResolver};
use super::store::{FsLocalStore, LocalStore, RemoteStore};

/// Tracks how many calls overlap.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

async fn pause(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Probe(String),
    Upload { local: PathBuf, identity: String },
    Download { identity: String, local: PathBuf },
    Delete(String),
}

#[derive(Default)]
pub struct FakeRemote {
    objects: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    slow: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<RemoteCall>>,
    gauge: Gauge,
    delay: Duration,
}

impl FakeRemote {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn insert(&self, name: &str) {
        self.objects.lock().unwrap().insert(name.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.lock().unwrap().contains(name)
    }

    /// Every call for `name` fails with a 503 until cleared.
    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Calls for `name` take `delay` instead of the default.
    pub fn delay_on(&self, name: &str, delay: Duration) {
        self.slow.lock().unwrap().insert(name.to_string(), delay);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&RemoteCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub fn uploads(&self) -> usize {
        self.count(|c| matches!(c, RemoteCall::Upload { .. }))
    }

    pub fn downloads(&self) -> usize {
        self.count(|c| matches!(c, RemoteCall::Download { .. }))
    }

    pub fn deletes(&self) -> usize {
        self.count(|c| matches!(c, RemoteCall::Delete(_)))
    }

    pub fn max_concurrency(&self) -> usize {
        self.gauge.max()
    }

    async fn track(&self, identity: &str, call: RemoteCall) -> Result<(), StorageError> {
        self.calls.lock().unwrap().push(call);
        let delay = self
            .slow
            .lock()
            .unwrap()
            .get(identity)
            .copied()
            .unwrap_or(self.delay);
        self.gauge.enter();
        pause(delay).await;
        self.gauge.exit();
        if self.failing.lock().unwrap().contains(identity) {
            return Err(status_error(StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(())
    }
}

pub fn status_error(status: StatusCode) -> StorageError {
    StorageError::Api {
        status,
        body: String::new(),
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn probe(&self, identity: &FileIdentity) -> Result<Option<ObjectMetadata>, StorageError> {
        let name = identity.as_str();
        self.track(name, RemoteCall::Probe(name.to_string())).await?;
        Ok(self.contains(name).then(|| ObjectMetadata {
            name: name.to_string(),
            bucket: None,
            size: None,
            content_type: None,
            updated: None,
            md5_hash: None,
        }))
    }

    async fn upload(&self, local: &Path, identity: &FileIdentity) -> Result<(), StorageError> {
        let name = identity.as_str();
        self.track(
            name,
            RemoteCall::Upload {
                local: local.to_path_buf(),
                identity: name.to_string(),
            },
        )
        .await?;
        tokio::fs::metadata(local).await?;
        self.insert(name);
        Ok(())
    }

    async fn download(&self, identity: &FileIdentity, local: &Path) -> Result<(), StorageError> {
        let name = identity.as_str();
        self.track(
            name,
            RemoteCall::Download {
                identity: name.to_string(),
                local: local.to_path_buf(),
            },
        )
        .await?;
        if !self.contains(name) {
            return Err(status_error(StatusCode::NOT_FOUND));
        }
        tokio::fs::write(local, format!("remote:{name}")).await?;
        Ok(())
    }

    async fn delete(&self, identity: &FileIdentity) -> Result<(), StorageError> {
        let name = identity.as_str();
        self.track(name, RemoteCall::Delete(name.to_string())).await?;
        if self.objects.lock().unwrap().remove(name) {
            Ok(())
        } else {
            Err(status_error(StatusCode::NOT_FOUND))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCall {
    Exists(PathBuf),
    EnsureDir(PathBuf),
    Move { from: PathBuf, to: PathBuf },
    Remove(PathBuf),
}

/// Real filesystem underneath, with call logging and injectable remove failures.
#[derive(Default)]
pub struct FakeLocal {
    inner: FsLocalStore,
    failing_removes: Mutex<HashSet<PathBuf>>,
    calls: Mutex<Vec<LocalCall>>,
    gauge: Gauge,
    delay: Duration,
}

impl FakeLocal {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fail_remove(&self, path: &Path) {
        self.failing_removes
            .lock()
            .unwrap()
            .insert(path.to_path_buf());
    }

    pub fn calls(&self) -> Vec<LocalCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !matches!(c, LocalCall::Exists(_)))
            .count()
    }

    pub fn max_concurrency(&self) -> usize {
        self.gauge.max()
    }

    async fn track(&self, call: LocalCall) {
        self.calls.lock().unwrap().push(call);
        self.gauge.enter();
        pause(self.delay).await;
        self.gauge.exit();
    }
}

#[async_trait]
impl LocalStore for FakeLocal {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        self.track(LocalCall::Exists(path.to_path_buf())).await;
        self.inner.exists(path).await
    }

    async fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        self.track(LocalCall::EnsureDir(path.to_path_buf())).await;
        self.inner.ensure_dir(path).await
    }

    async fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.track(LocalCall::Move {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        })
        .await;
        self.inner.move_file(from, to).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.track(LocalCall::Remove(path.to_path_buf())).await;
        if self.failing_removes.lock().unwrap().contains(path) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        self.inner.remove(path).await
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub remote: Arc<FakeRemote>,
    pub local: Arc<FakeLocal>,
    pub store: AttachmentStore,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let remote = Arc::new(FakeRemote::with_delay(delay));
        let local = Arc::new(FakeLocal::with_delay(delay));
        let store = AttachmentStore::new(
            remote.clone(),
            local.clone(),
            PathResolver::new(dir.path().join("docs")),
        );
        Self {
            dir,
            remote,
            local,
            store,
        }
    }

    pub fn engine(&self, batch_size: usize) -> SyncEngine {
        SyncEngine::with_owner("trip-1", self.store.clone(), batch_size)
    }

    pub fn path_of(&self, raw: &str) -> PathBuf {
        self.store.resolver().resolve(&id(raw))
    }

    pub fn write_local(&self, raw: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path_of(raw);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

pub fn id(raw: &str) -> FileIdentity {
    FileIdentity::new(raw).unwrap()
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
