//! Encrypted document envelope.
//!
//! The ciphertext stored in the content-addressed store is the CBOR encoding
//! of an [`EncryptedDocument`]. Its content address is computed over those
//! bytes, so the envelope is immutable once published.

use serde::{Deserialize, Serialize};

use crate::crypto::EncryptionNonce;
use crate::error::{CryptoError, Result};

/// Format identifier for encrypted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionFormat {
    /// ChaCha20-Poly1305 with 256-bit key.
    ChaCha20Poly1305 = 1,
}

/// A document encrypted under its content key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedDocument {
    /// Encryption algorithm used.
    pub format: EncryptionFormat,

    /// Nonce used for encryption (unique per document).
    pub nonce: EncryptionNonce,

    /// The encrypted data (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedDocument {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CryptoError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CryptoError::SerializationError(e.to_string()))
    }

    /// Get the size of the ciphertext.
    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_serialization() {
        let envelope = EncryptedDocument {
            format: EncryptionFormat::ChaCha20Poly1305,
            nonce: EncryptionNonce([3; 12]),
            ciphertext: vec![1, 2, 3, 4],
        };

        let bytes = envelope.to_bytes().unwrap();
        let recovered = EncryptedDocument::from_bytes(&bytes).unwrap();

        assert_eq!(envelope, recovered);
        assert_eq!(recovered.ciphertext_len(), 4);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = EncryptedDocument::from_bytes(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, CryptoError::SerializationError(_)));
    }
}
