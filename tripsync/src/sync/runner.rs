use std::sync::Arc;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::{EngineError, EngineInner, Shared, SyncEngine};
use super::paths::FileIdentity;
use super::queue::{SyncAction, SyncTask};

/// Runner lifecycle. Only `Draining` counts as a batch in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Draining { batch: usize },
    /// The last batch had failures. Draining resumes only on the next `run_next`.
    Stalled { failed: usize },
}

impl RunnerState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RunnerState::Draining { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub identity: FileIdentity,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Size of each batch, in execution order.
    pub batches: Vec<usize>,
    pub succeeded: Vec<FileIdentity>,
    pub failed: Vec<TaskFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another batch was already in flight.
    Busy,
    /// Nothing was queued.
    Idle,
    Drained(DrainReport),
    /// A batch failed; remaining tasks wait for the next `run_next`.
    Stalled(DrainReport),
}

impl SyncEngine {
    /// Drains the queue batch by batch until it is empty or a batch fails.
    ///
    /// The drive loop runs on its own task, so dropping the returned future neither cancels
    /// in-flight work nor leaves the runner marked as draining.
    pub async fn run_next(&self) -> Result<RunOutcome, EngineError> {
        self.spawn_run_next().await?
    }

    /// Starts draining without waiting for it.
    pub fn spawn_run_next(&self) -> JoinHandle<Result<RunOutcome, EngineError>> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.drain().await })
    }
}

impl EngineInner {
    async fn drain(self: Arc<Self>) -> Result<RunOutcome, EngineError> {
        let mut batch = {
            let mut shared = self.shared.lock().await;
            if shared.state.is_in_flight() {
                return Ok(RunOutcome::Busy);
            }
            if shared.queue.is_empty() {
                shared.state = RunnerState::Idle;
                return Ok(RunOutcome::Idle);
            }
            self.begin_batch(&mut shared)
        };

        let mut report = DrainReport::default();
        loop {
            report.batches.push(batch.len());
            info!(owner = %self.owner, size = batch.len(), "batch started");
            let failed_before = report.failed.len();
            self.run_batch(batch, &mut report).await;
            let failed = report.failed.len() - failed_before;

            let mut shared = self.shared.lock().await;
            if failed > 0 {
                shared.state = RunnerState::Stalled { failed };
                warn!(
                    owner = %self.owner,
                    failed,
                    remaining = shared.queue.len(),
                    "batch failed; draining paused until the next run"
                );
                return Ok(RunOutcome::Stalled(report));
            }
            shared.state = RunnerState::Idle;
            if shared.queue.is_empty() {
                info!(
                    owner = %self.owner,
                    batches = report.batches.len(),
                    synced = report.succeeded.len(),
                    "queue drained"
                );
                return Ok(RunOutcome::Drained(report));
            }
            // Chain under the same lock so no other caller can slip a batch in between.
            batch = self.begin_batch(&mut shared);
        }
    }

    fn begin_batch(&self, shared: &mut Shared) -> Vec<SyncTask> {
        let batch = shared.queue.peek_batch(self.batch_size);
        shared.state = RunnerState::Draining { batch: batch.len() };
        batch
    }

    async fn run_batch(self: &Arc<Self>, batch: Vec<SyncTask>, report: &mut DrainReport) {
        let handles: Vec<_> = batch
            .into_iter()
            .map(|task| {
                let inner = Arc::clone(self);
                let identity = task.identity.clone();
                (identity, tokio::spawn(async move { inner.execute(task).await }))
            })
            .collect();

        let settled = join_all(
            handles
                .into_iter()
                .map(|(identity, handle)| async move { (identity, handle.await) }),
        )
        .await;

        for (identity, joined) in settled {
            let result = match joined {
                Ok(result) => result,
                Err(source) => {
                    // The task never reached its own dequeue.
                    self.shared.lock().await.queue.dequeue(&identity);
                    Err(EngineError::TaskAborted {
                        identity: identity.clone(),
                        source,
                    })
                }
            };
            match result {
                Ok(()) => report.succeeded.push(identity),
                Err(err) => {
                    warn!(owner = %self.owner, identity = %identity, error = %err, "sync task failed");
                    report.failed.push(TaskFailure {
                        identity,
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    /// Runs one task and removes it from the queue as soon as it settles, whatever the outcome.
    async fn execute(&self, task: SyncTask) -> Result<(), EngineError> {
        let result = match task.action {
            SyncAction::Sync => self
                .store
                .reconcile(&task.identity, task.payload.known_local.as_deref())
                .await
                .map(|outcome| {
                    debug!(identity = %task.identity, ?outcome, "sync task done");
                }),
            SyncAction::Delete => self.store.delete_file(&task.identity).await.map(|_push| {
                debug!(identity = %task.identity, "delete task done");
            }),
        };
        self.shared.lock().await.queue.dequeue(&task.identity);
        result
    }
}
