//! The action both intake paths invoke.

use async_trait::async_trait;
use serde::Serialize;

use dirsync_core::SyncError;

/// What a deletion request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionOutcome {
    /// The identity existed and was removed from both stores.
    Deleted,
    /// No identity with that union id exists; nothing was changed.
    NotFound,
}

/// Receives identity lifecycle events decoded from a webhook or the bus.
#[async_trait]
pub trait IdentityEventHandler: Send + Sync {
    /// Remove the identity with this raw (unscoped) union id.
    ///
    /// Must be idempotent: a repeated call for an already deleted identity
    /// returns `DeletionOutcome::NotFound` without touching either store.
    async fn user_deleted(&self, union_id: &str) -> Result<DeletionOutcome, SyncError>;
}
