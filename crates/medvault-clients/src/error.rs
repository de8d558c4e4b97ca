//! Error types for collaborator clients.

use thiserror::Error;

use medvault_core::{ContentAddress, KeyVersion, RecipientId, TokenId};

/// Errors returned by the content store, ledger and key directory.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The content store could not be reached.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The ledger could not be reached or did not acknowledge.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The key directory could not be reached.
    #[error("key directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// The ledger holds a different key version than the update expects.
    #[error("stale version for token {token_id}: ledger at {current}, update carries {attempted}")]
    StaleVersion {
        token_id: TokenId,
        current: KeyVersion,
        attempted: KeyVersion,
    },

    /// No ledger token with this id.
    #[error("token {0} not found")]
    TokenNotFound(TokenId),

    /// No blob at this address.
    #[error("blob {0} not found")]
    BlobNotFound(ContentAddress),

    /// The recipient has no registered public key.
    #[error("no public key registered for {0}")]
    KeyNotFound(RecipientId),

    /// The ledger refused a malformed record.
    #[error("invalid ledger record: {0}")]
    InvalidRecord(String),
}

impl ClientError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::StorageUnavailable(_)
                | ClientError::LedgerUnavailable(_)
                | ClientError::DirectoryUnavailable(_)
        )
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
