use std::collections::HashMap;

use tokio::sync::Mutex;

use super::attachments::AttachmentStore;
use super::engine::SyncEngine;

/// One engine per owner, all sharing the same stores. Owners drain independently of each other.
pub struct EngineRegistry {
    store: AttachmentStore,
    batch_size: usize,
    engines: Mutex<HashMap<String, SyncEngine>>,
}

impl EngineRegistry {
    pub fn new(store: AttachmentStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size,
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub async fn engine_for(&self, owner: &str) -> SyncEngine {
        let mut engines = self.engines.lock().await;
        engines
            .entry(owner.to_string())
            .or_insert_with(|| SyncEngine::with_owner(owner, self.store.clone(), self.batch_size))
            .clone()
    }

    /// Forgets an owner's engine once it has nothing left to do. Returns whether it was removed.
    pub async fn release_if_idle(&self, owner: &str) -> bool {
        let mut engines = self.engines.lock().await;
        let Some(engine) = engines.get(owner) else {
            return false;
        };
        if engine.pending().await > 0 || engine.state().await.is_in_flight() {
            return false;
        }
        engines.remove(owner);
        true
    }

    pub async fn owners(&self) -> Vec<String> {
        let mut owners: Vec<_> = self.engines.lock().await.keys().cloned().collect();
        owners.sort();
        owners
    }
}
