//! Error types for MedVault core primitives.

use thiserror::Error;

/// Errors raised while parsing identifiers or verifying signed events.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid verifying key")]
    InvalidVerifyingKey,

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("key version overflow")]
    VersionOverflow,

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
