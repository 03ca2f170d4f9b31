//! The deletion action shared by the webhook and bus paths.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use dirsync_core::{DataMapper, SyncError, SyncPhase};
use dirsync_events::{DeletionOutcome, IdentityEventHandler};

use crate::writer::DualStoreWriter;

/// Removes users by their remote union id. Deleting a user that does not
/// exist succeeds with [`DeletionOutcome::NotFound`], so redelivered events
/// are harmless.
pub struct Deprovisioner {
    writer: Arc<DualStoreWriter>,
    mapper: DataMapper,
}

impl Deprovisioner {
    pub fn new(writer: Arc<DualStoreWriter>) -> Self {
        let mapper = DataMapper::from_config(writer.config());
        Self { writer, mapper }
    }

    /// Delete the user whose unscoped union id is `union_id`.
    #[instrument(skip(self), fields(source = %self.mapper.source()))]
    pub async fn delete_by_union_id(&self, union_id: &str) -> Result<DeletionOutcome, SyncError> {
        if union_id.trim().is_empty() {
            warn!("Ignoring deletion with empty union id");
            return Ok(DeletionOutcome::NotFound);
        }

        let key = self.mapper.scope_union_id(union_id);
        let Some(user) = self
            .writer
            .relational()
            .find_user_by_union_id(&key)
            .await
            .map_err(|e| SyncError::from(e).in_phase(SyncPhase::Deletion, &key))?
        else {
            debug!(key = %key, "No user for union id");
            return Ok(DeletionOutcome::NotFound);
        };

        if self.writer.delete_user(&user).await? {
            info!(key = %key, username = %user.username, "User deprovisioned");
            Ok(DeletionOutcome::Deleted)
        } else {
            debug!(key = %key, "User removed concurrently");
            Ok(DeletionOutcome::NotFound)
        }
    }
}

#[async_trait]
impl IdentityEventHandler for Deprovisioner {
    async fn user_deleted(&self, union_id: &str) -> Result<DeletionOutcome, SyncError> {
        self.delete_by_union_id(union_id).await
    }
}

impl std::fmt::Debug for Deprovisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deprovisioner")
            .field("source", &self.mapper.source())
            .finish_non_exhaustive()
    }
}
