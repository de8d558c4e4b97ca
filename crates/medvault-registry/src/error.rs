//! Registry failures.

use thiserror::Error;

use medvault_core::{DocumentId, KeyVersion};

/// Why a registry call failed.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A record already exists for this document.
    #[error("document {0} already registered")]
    DuplicateDocument(DocumentId),

    /// No record for this document.
    #[error("document {0} not found")]
    NotFound(DocumentId),

    /// The offered version does not follow the current one.
    #[error("version conflict on {document_id}: current {current}, attempted {attempted}")]
    VersionConflict {
        document_id: DocumentId,
        current: KeyVersion,
        attempted: KeyVersion,
    },

    /// A mutation would break a record invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A lock guarding registry state was poisoned by a panicking writer.
    #[error("registry lock poisoned")]
    LockPoisoned,

    /// The SQLite backend failed.
    #[error("sqlite: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Serialization(String),

    /// The on-disk schema cannot be brought to the current version.
    #[error("schema migration: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
