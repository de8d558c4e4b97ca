//! Key material types.
//!
//! X25519 key agreement keys for recipients and the ChaCha20-Poly1305
//! content key. Secret types zero their memory on drop and never implement
//! `Clone`, `Serialize` or a revealing `Debug`.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};

/// An X25519 public key (32 bytes) that key wraps are addressed to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse from an untrusted byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to x25519-dalek PublicKey.
    pub(crate) fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

impl fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519Pub(")?;
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

/// An X25519 static secret: the private half of a recipient's wrapping key.
pub struct X25519StaticSecret(pub(crate) StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }
}

impl fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519StaticSecret({:?})", self.public_key())
    }
}

/// The symmetric key that encrypts one document.
///
/// Exists only in memory while a document is being encrypted or a key set
/// re-wrapped; the bytes are wiped when the value is dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    /// Length of a content key in bytes.
    pub const LEN: usize = 32;

    /// Fill a new key from the OS entropy source.
    pub(crate) fn random() -> Result<Self> {
        let mut key = Self([0u8; 32]);
        OsRng
            .try_fill_bytes(&mut key.0)
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))?;
        Ok(key)
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; 12];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_from_slice_checks_length() {
        assert_eq!(
            X25519PublicKey::from_slice(&[1u8; 31]),
            Err(CryptoError::InvalidPublicKey)
        );
        assert!(X25519PublicKey::from_slice(&[1u8; 32]).is_ok());
    }

    #[test]
    fn test_secret_from_seed_is_deterministic() {
        let a = X25519StaticSecret::from_bytes([7; 32]);
        let b = X25519StaticSecret::from_bytes([7; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_random_content_keys_differ() {
        let a = ContentKey::random().unwrap();
        let b = ContentKey::random().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_content_key_debug_is_redacted() {
        let key = ContentKey::from_bytes([0xAB; 32]);
        assert_eq!(format!("{:?}", key), "ContentKey(<redacted>)");
    }
}
