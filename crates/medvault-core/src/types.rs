//! Strong type definitions for MedVault.
//!
//! All identifiers are newtypes to prevent misuse at compile time: a
//! `DocumentId` can never be passed where a `ContentAddress` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Implements the shared surface of a 32-byte identifier newtype.
macro_rules! id32 {
    ($name:ident, $label:literal) => {
        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from a 64-character hex string.
            pub fn from_hex(s: &str) -> Result<Self> {
                let bytes = hex::decode(s)
                    .map_err(|e| CoreError::InvalidIdentifier(format!("{}: {}", $label, e)))?;
                Self::try_from(bytes.as_slice())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $label, &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", &self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = CoreError;

            fn try_from(slice: &[u8]) -> Result<Self> {
                let arr: [u8; 32] = slice.try_into().map_err(|_| {
                    CoreError::InvalidIdentifier(format!(
                        "{}: expected 32 bytes, got {}",
                        $label,
                        slice.len()
                    ))
                })?;
                Ok(Self(arr))
            }
        }
    };
}

/// Identifier of a stored document.
///
/// Derived from the owner and the content address of the ciphertext, so the
/// same owner storing the same ciphertext twice maps to the same document.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub [u8; 32]);

id32!(DocumentId, "DocumentId");

impl DocumentId {
    /// Derive the document id for `owner` storing the blob at `address`.
    pub fn derive(owner: &RecipientId, address: &ContentAddress) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("medvault-document-id-v1");
        hasher.update(&owner.0);
        hasher.update(&address.0);
        Self(*hasher.finalize().as_bytes())
    }
}

/// A party that can hold wrapped keys: its Ed25519 verifying key.
///
/// Access events are signed with the matching signing key, so the recipient
/// id doubles as the authentication key for requests.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecipientId(pub [u8; 32]);

id32!(RecipientId, "RecipientId");

/// Address of a blob in content-addressed storage.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentAddress(pub [u8; 32]);

id32!(ContentAddress, "ContentAddress");

impl ContentAddress {
    /// Compute the Blake3 content address of a blob.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }
}

/// Hash of a ledger transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

id32!(TxHash, "TxHash");

/// Ledger token id of a document's ownership record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic counter of a document's authoritative wrapped-key set.
///
/// Starts at [`KeyVersion::INITIAL`] and moves forward by exactly one per
/// re-wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyVersion(pub u64);

impl KeyVersion {
    /// The version a document is created at.
    pub const INITIAL: Self = Self(1);

    /// The version that follows this one.
    pub fn next(self) -> Result<Self> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or(CoreError::VersionOverflow)
    }

    /// The version before this one, if any.
    pub fn prev(self) -> Option<Self> {
        if self.0 > Self::INITIAL.0 {
            Some(Self(self.0 - 1))
        } else {
            None
        }
    }

    /// Get the raw counter.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for KeyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_hex_roundtrip() {
        let id = DocumentId::from_bytes([0x42; 32]);
        let recovered = DocumentId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_from_hex_rejects_short_input() {
        assert!(RecipientId::from_hex("abcd").is_err());
        assert!(RecipientId::from_hex("zz").is_err());
    }

    #[test]
    fn test_display_is_short_hex() {
        let id = ContentAddress::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", id), "abababababababab");
        assert!(format!("{:?}", id).starts_with("ContentAddress("));
    }

    #[test]
    fn test_document_id_derivation() {
        let owner = RecipientId::from_bytes([1; 32]);
        let other = RecipientId::from_bytes([2; 32]);
        let address = ContentAddress::of(b"ciphertext");

        assert_eq!(
            DocumentId::derive(&owner, &address),
            DocumentId::derive(&owner, &address)
        );
        assert_ne!(
            DocumentId::derive(&owner, &address),
            DocumentId::derive(&other, &address)
        );
    }

    #[test]
    fn test_key_version_steps() {
        let v1 = KeyVersion::INITIAL;
        let v2 = v1.next().unwrap();
        assert_eq!(v2, KeyVersion(2));
        assert_eq!(v2.prev(), Some(v1));
        assert_eq!(v1.prev(), None);
        assert!(KeyVersion(u64::MAX).next().is_err());
        assert_eq!(v2.to_string(), "v2");
    }
}
