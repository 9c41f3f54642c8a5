use std::path::Path;

use tracing::debug;

use super::attachments::AttachmentStore;
use super::engine::EngineError;
use super::paths::FileIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Downloaded,
    Uploaded,
    InSync,
}

impl AttachmentStore {
    /// Makes the local and remote copies of `identity` agree using presence alone.
    ///
    /// `known_local` overrides where the local copy is looked for (a file captured but not yet
    /// moved into place); downloads always land on the resolved path. When both copies exist
    /// nothing is compared or transferred.
    pub async fn reconcile(
        &self,
        identity: &FileIdentity,
        known_local: Option<&Path>,
    ) -> Result<Reconciliation, EngineError> {
        let resolved = self.resolver.resolve(identity);
        let local_path = known_local.unwrap_or(resolved.as_path());

        let (local_exists, remote) = tokio::join!(
            self.local.exists(local_path),
            self.remote.probe(identity)
        );
        let local_exists = local_exists?;
        let remote_exists = remote?.is_some();

        let outcome = match (local_exists, remote_exists) {
            (false, false) => {
                return Err(EngineError::Integrity {
                    identity: identity.clone(),
                });
            }
            (false, true) => {
                if let Some(parent) = resolved.parent() {
                    self.local.ensure_dir(parent).await?;
                }
                self.remote.download(identity, &resolved).await?;
                Reconciliation::Downloaded
            }
            (true, false) => {
                self.remote.upload(local_path, identity).await?;
                Reconciliation::Uploaded
            }
            (true, true) => Reconciliation::InSync,
        };
        debug!(identity = %identity, ?outcome, "reconciled");
        Ok(outcome)
    }
}
