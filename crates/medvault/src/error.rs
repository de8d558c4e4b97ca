//! Error types for the vault.

use thiserror::Error;

use medvault_clients::ClientError;
use medvault_core::{CoreError, DocumentId, KeyVersion, RecipientId, TokenId};
use medvault_crypto::CryptoError;
use medvault_registry::RegistryError;

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    // ─────────────────────────────────────────────────────────────────────────
    // Cryptographic
    // ─────────────────────────────────────────────────────────────────────────
    /// A recipient's public key is malformed or degenerate.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// A wrapped key could not be opened.
    #[error("unwrap failure")]
    UnwrapFailure,

    /// Document ciphertext failed authentication.
    #[error("tampered ciphertext")]
    TamperedCiphertext,

    /// Other cryptographic failure (entropy, encoding).
    #[error("crypto error: {0}")]
    Crypto(String),

    // ─────────────────────────────────────────────────────────────────────────
    // Registry
    // ─────────────────────────────────────────────────────────────────────────
    /// The document is already registered.
    #[error("document {0} already exists")]
    DuplicateDocument(DocumentId),

    /// The document is not registered.
    #[error("document {0} not found")]
    NotFound(DocumentId),

    /// Another re-wrap won the race for this version.
    #[error("version conflict on {document_id}: current {current}, attempted {attempted}")]
    VersionConflict {
        document_id: DocumentId,
        current: KeyVersion,
        attempted: KeyVersion,
    },

    /// Registry storage fault.
    #[error("registry error: {0}")]
    Registry(RegistryError),

    // ─────────────────────────────────────────────────────────────────────────
    // Policy
    // ─────────────────────────────────────────────────────────────────────────
    /// The requester may not change this document's access.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The target is not a known (or not an active) recipient.
    #[error("unknown recipient {0}")]
    UnknownRecipient(RecipientId),

    /// Revoking the target would leave the document without recipients.
    #[error("cannot revoke the last recipient of {0}")]
    CannotRevokeLastRecipient(DocumentId),

    /// The event is well-signed but cannot be processed as submitted.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    // ─────────────────────────────────────────────────────────────────────────
    // Collaborators
    // ─────────────────────────────────────────────────────────────────────────
    /// The content store failed or timed out.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The ledger failed or timed out.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The key directory failed or timed out.
    #[error("key directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// The ledger is not at the version the update expects.
    #[error("stale version for token {token_id}: ledger at {current}, update carries {attempted}")]
    StaleVersion {
        token_id: TokenId,
        current: KeyVersion,
        attempted: KeyVersion,
    },

    /// Other collaborator failure (missing token or blob, rejected record).
    #[error("collaborator error: {0}")]
    Client(ClientError),

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────
    /// The agent is not running, or stopped before the event started.
    #[error("agent stopped")]
    AgentStopped,

    /// Publishing failed and the registry could not be restored.
    #[error(
        "rollback of {document_id} at {version} failed ({rollback}) after publish error: {publish}"
    )]
    RollbackFailed {
        document_id: DocumentId,
        version: KeyVersion,
        publish: String,
        rollback: String,
    },
}

impl VaultError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VaultError::StorageUnavailable(_)
                | VaultError::LedgerUnavailable(_)
                | VaultError::DirectoryUnavailable(_)
        )
    }
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidPublicKey => VaultError::InvalidPublicKey,
            CryptoError::UnwrapFailure => VaultError::UnwrapFailure,
            CryptoError::TamperedCiphertext => VaultError::TamperedCiphertext,
            other => VaultError::Crypto(other.to_string()),
        }
    }
}

impl From<RegistryError> for VaultError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::DuplicateDocument(id) => VaultError::DuplicateDocument(id),
            RegistryError::NotFound(id) => VaultError::NotFound(id),
            RegistryError::VersionConflict {
                document_id,
                current,
                attempted,
            } => VaultError::VersionConflict {
                document_id,
                current,
                attempted,
            },
            other => VaultError::Registry(other),
        }
    }
}

impl From<ClientError> for VaultError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::StorageUnavailable(m) => VaultError::StorageUnavailable(m),
            ClientError::LedgerUnavailable(m) => VaultError::LedgerUnavailable(m),
            ClientError::DirectoryUnavailable(m) => VaultError::DirectoryUnavailable(m),
            ClientError::StaleVersion {
                token_id,
                current,
                attempted,
            } => VaultError::StaleVersion {
                token_id,
                current,
                attempted,
            },
            ClientError::KeyNotFound(recipient) => VaultError::UnknownRecipient(recipient),
            other => VaultError::Client(other),
        }
    }
}

impl From<CoreError> for VaultError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidVerifyingKey => {
                VaultError::Unauthorized(e.to_string())
            }
            other => VaultError::InvalidEvent(other.to_string()),
        }
    }
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailability_is_transient() {
        assert!(VaultError::StorageUnavailable("x".into()).is_transient());
        assert!(VaultError::LedgerUnavailable("x".into()).is_transient());
        assert!(VaultError::DirectoryUnavailable("x".into()).is_transient());

        assert!(!VaultError::UnwrapFailure.is_transient());
        assert!(!VaultError::Unauthorized("x".into()).is_transient());
        assert!(!VaultError::AgentStopped.is_transient());
        assert!(!VaultError::StaleVersion {
            token_id: TokenId(1),
            current: KeyVersion(2),
            attempted: KeyVersion(2),
        }
        .is_transient());
    }

    #[test]
    fn test_client_errors_map_to_taxonomy() {
        let recipient = RecipientId::from_bytes([1; 32]);
        assert!(matches!(
            VaultError::from(ClientError::KeyNotFound(recipient)),
            VaultError::UnknownRecipient(r) if r == recipient
        ));
        assert!(matches!(
            VaultError::from(ClientError::TokenNotFound(TokenId(3))),
            VaultError::Client(_)
        ));
    }

    #[test]
    fn test_crypto_errors_map_to_taxonomy() {
        assert!(matches!(
            VaultError::from(CryptoError::UnwrapFailure),
            VaultError::UnwrapFailure
        ));
        assert!(matches!(
            VaultError::from(CryptoError::EntropyUnavailable("x".into())),
            VaultError::Crypto(_)
        ));
    }
}
