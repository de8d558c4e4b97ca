//! Error types for the crypto module.

use thiserror::Error;

/// Errors that can occur while wrapping keys or encrypting documents.
///
/// `UnwrapFailure` deliberately carries no detail: wrong key, tampered
/// ciphertext and malformed input all look the same to the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Recipient public key is malformed or a low-order point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// A wrapped key could not be opened.
    #[error("unwrap failure")]
    UnwrapFailure,

    /// Document ciphertext failed authentication.
    #[error("tampered ciphertext")]
    TamperedCiphertext,

    /// A wrapped key set breaks its structural rules.
    #[error("invalid key set: {0}")]
    InvalidKeySet(String),

    /// The OS entropy source failed.
    #[error("entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
