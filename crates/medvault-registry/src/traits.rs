//! AccessRegistry trait: the abstract interface for access records.
//!
//! Implementations include SQLite (primary) and in-memory (for tests). Both
//! enforce the same rules through [`crate::record`].

use std::collections::BTreeSet;

use async_trait::async_trait;

use medvault_core::{DocumentId, KeyVersion, RecipientId};
use medvault_crypto::{WrappedKey, WrappedKeySet};

use crate::error::{RegistryError, Result};
use crate::record::{AccessRecord, Genesis};

/// The AccessRegistry trait: who holds a usable key for each document.
///
/// # Design Notes
///
/// - **Single writer per version**: `apply_rewrap` accepts exactly
///   `current + 1`; any other version is a `VersionConflict`. This is the
///   optimistic-concurrency guard across processes.
/// - **Atomic replacement**: a re-wrap replaces the whole active set and
///   bumps the version in one step.
/// - **History is retained**: superseded wrapped keys stay readable through
///   [`AccessRegistry::history`]. Only [`AccessRegistry::rollback`] deletes
///   keys, and only the unconfirmed newest version.
#[async_trait]
pub trait AccessRegistry: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a new document at version 1.
    ///
    /// Returns `DuplicateDocument` if the id is already registered.
    async fn create(&self, genesis: Genesis) -> Result<AccessRecord>;

    /// Get a document's record.
    ///
    /// Returns `NotFound` if the id is unknown.
    async fn get(&self, document_id: &DocumentId) -> Result<AccessRecord>;

    /// Replace the active set with `keys` and bump the version.
    ///
    /// Returns `VersionConflict` unless `keys.key_version == current + 1`.
    async fn apply_rewrap(
        &self,
        document_id: &DocumentId,
        keys: &WrappedKeySet,
    ) -> Result<AccessRecord>;

    /// Undo the re-wrap that produced `version`.
    ///
    /// Requires `current == version` and `version > 1`. The active set at
    /// `version - 1` is restored and the keys at `version` are discarded.
    async fn rollback(&self, document_id: &DocumentId, version: KeyVersion)
        -> Result<AccessRecord>;

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Every retained wrapped key, ordered by version then recipient.
    ///
    /// Custodian copies are not included.
    async fn history(&self, document_id: &DocumentId) -> Result<Vec<WrappedKey>>;

    /// All registered documents, in id order.
    async fn list_documents(&self) -> Result<Vec<DocumentId>>;

    /// The active recipient set.
    async fn list_recipients(&self, document_id: &DocumentId) -> Result<BTreeSet<RecipientId>> {
        Ok(self.get(document_id).await?.recipient_ids())
    }

    /// Check if a document is registered.
    async fn contains(&self, document_id: &DocumentId) -> Result<bool> {
        match self.get(document_id).await {
            Ok(_) => Ok(true),
            Err(RegistryError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
