//! Lazy, single-flight acquisition of the backend volume handle.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::backend::{StorageBackend, Volume, QUOTA_PROTOCOLS};
use crate::error::FsError;
use crate::{path, Result};

/// Owns the volume handle for one adapter instance.
///
/// The handle is requested at most once per adapter lifetime. Concurrent
/// first callers share the in-flight initialization, and the memoized
/// outcome, success or failure alike, is replayed to every later caller;
/// there is no automatic retry.
pub(crate) struct VolumeManager {
    backend: Arc<dyn StorageBackend>,
    repository: String,
    quota: u64,
    cell: OnceCell<Result<Arc<dyn Volume>>>,
}

impl VolumeManager {
    pub(crate) fn new(backend: Arc<dyn StorageBackend>, repository: String, quota: u64) -> Self {
        Self {
            backend,
            repository,
            quota,
            cell: OnceCell::new(),
        }
    }

    pub(crate) async fn volume(&self) -> Result<Arc<dyn Volume>> {
        self.cell.get_or_init(|| self.acquire()).await.clone()
    }

    async fn acquire(&self) -> Result<Arc<dyn Volume>> {
        let repository = self.repository.as_str();
        let translate = |err| FsError::translate(repository, "/", err);

        // Negotiate through the first protocol the environment offers; a
        // backend without any negotiation surface gets the configured
        // ceiling passed straight through.
        let protocol = QUOTA_PROTOCOLS
            .into_iter()
            .find(|p| self.backend.supports_protocol(*p));
        let granted = match protocol {
            Some(protocol) => {
                let granted = self
                    .backend
                    .request_quota(protocol, self.quota)
                    .await
                    .map_err(translate)?;
                debug!(?protocol, granted, "negotiated storage quota");
                granted
            }
            None => {
                debug!("no quota negotiation protocol available, skipping");
                self.quota
            }
        };

        let volume = self
            .backend
            .request_volume(granted)
            .await
            .map_err(translate)?;

        // The repository prefix must exist before any path is resolved
        // against it.
        let mut prefix = String::from("/");
        for component in repository.split('/').filter(|c| !c.is_empty()) {
            prefix = path::join(&prefix, component);
            volume
                .get_directory(&prefix, true)
                .await
                .map_err(translate)?;
        }

        debug!(repository, "acquired backend volume");
        Ok(volume)
    }
}
