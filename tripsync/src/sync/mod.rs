pub mod attachments;
pub mod engine;
pub mod paths;
pub mod queue;
pub mod reconcile;
pub mod registry;
pub mod runner;
pub mod store;
#[cfg(test)]
mod testing;

pub use attachments::{AttachmentStore, DetachedPush, SavedFile, TransientPushError};
pub use engine::{DEFAULT_BATCH_SIZE, EngineError, SyncEngine};
pub use paths::{FileIdentity, PathError, PathResolver};
pub use queue::{SyncAction, SyncQueue, SyncTask, TaskPayload};
pub use reconcile::Reconciliation;
pub use registry::EngineRegistry;
pub use runner::{DrainReport, RunOutcome, RunnerState, TaskFailure};
pub use store::{FsLocalStore, LocalStore, RemoteStore};
