//! Wrapped content keys.
//!
//! A [`WrappedKey`] is one copy of a document's content key sealed to one
//! recipient's X25519 public key. A [`WrappedKeySet`] is every copy that is
//! valid for one key version: one per active recipient plus the custodian
//! copy the orchestrator uses to re-wrap.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use medvault_core::{Blake3Hash, CanonicalWriter, DocumentId, KeyVersion, RecipientId};

use crate::crypto::{EncryptionNonce, X25519PublicKey};
use crate::error::{CryptoError, Result};

/// Domain tag for wrap contexts (used as AEAD associated data).
pub const WRAP_CONTEXT_DOMAIN: &[u8] = b"medvault-wrap-context-v1:";

/// Domain tag for key set digests.
pub const KEY_SET_DOMAIN: &[u8] = b"medvault-key-set-v1:";

/// What a wrapped key is bound to.
///
/// Encoded canonically and authenticated alongside the wrapped key, so a
/// wrap cannot be replayed for another document, recipient or version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapContext {
    pub document_id: DocumentId,
    pub recipient: RecipientId,
    pub key_version: KeyVersion,
}

impl WrapContext {
    pub fn new(document_id: DocumentId, recipient: RecipientId, key_version: KeyVersion) -> Self {
        Self {
            document_id,
            recipient,
            key_version,
        }
    }

    /// Canonical bytes of this context.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = CanonicalWriter::with_domain(WRAP_CONTEXT_DOMAIN);
        w.map(3)
            .key(0)
            .bytes(self.document_id.as_bytes())
            .key(1)
            .bytes(self.recipient.as_bytes())
            .key(2)
            .uint(self.key_version.get())
            .end_map();
        w.finish()
    }
}

/// A content key encrypted to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub document_id: DocumentId,
    pub recipient: RecipientId,
    /// The X25519 key this copy was sealed to.
    pub recipient_public: X25519PublicKey,
    pub key_version: KeyVersion,
    /// Sender's side of the key agreement.
    pub ephemeral_public: X25519PublicKey,
    pub nonce: EncryptionNonce,
    /// Sealed content key (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl WrappedKey {
    /// The context this key was wrapped under.
    pub fn context(&self) -> WrapContext {
        WrapContext::new(self.document_id, self.recipient, self.key_version)
    }

    fn write_canonical(&self, w: &mut CanonicalWriter) {
        w.map(7)
            .key(0)
            .bytes(self.document_id.as_bytes())
            .key(1)
            .bytes(self.recipient.as_bytes())
            .key(2)
            .bytes(self.recipient_public.as_bytes())
            .key(3)
            .uint(self.key_version.get())
            .key(4)
            .bytes(self.ephemeral_public.as_bytes())
            .key(5)
            .bytes(self.nonce.as_bytes())
            .key(6)
            .bytes(&self.ciphertext)
            .end_map();
    }
}

/// Every wrapped copy of a content key for one key version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKeySet {
    pub key_version: KeyVersion,
    /// Sorted by recipient, one entry per active recipient.
    pub recipients: Vec<WrappedKey>,
    /// Copy sealed to the orchestrator's custodian key. Never counts as a
    /// recipient.
    pub custodian: WrappedKey,
}

impl WrappedKeySet {
    /// Build a set, ordering recipients canonically.
    pub fn new(
        key_version: KeyVersion,
        mut recipients: Vec<WrappedKey>,
        custodian: WrappedKey,
    ) -> Self {
        recipients.sort_by(|a, b| a.recipient.cmp(&b.recipient));
        Self {
            key_version,
            recipients,
            custodian,
        }
    }

    /// The document every key in this set belongs to.
    pub fn document_id(&self) -> DocumentId {
        self.custodian.document_id
    }

    /// The recipients holding a copy.
    pub fn recipient_ids(&self) -> BTreeSet<RecipientId> {
        self.recipients.iter().map(|k| k.recipient).collect()
    }

    /// The copy sealed to `recipient`, if any.
    pub fn get(&self, recipient: &RecipientId) -> Option<&WrappedKey> {
        self.recipients
            .binary_search_by(|k| k.recipient.cmp(recipient))
            .ok()
            .map(|i| &self.recipients[i])
    }

    pub fn contains(&self, recipient: &RecipientId) -> bool {
        self.get(recipient).is_some()
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Check the structural rules every published set must satisfy.
    ///
    /// Recipients are strictly ascending (so unique), and every copy
    /// including the custodian's names this set's document and version.
    pub fn check(&self) -> Result<()> {
        let document_id = self.document_id();

        if self.custodian.key_version != self.key_version {
            return Err(CryptoError::InvalidKeySet(format!(
                "custodian copy is {} but set is {}",
                self.custodian.key_version, self.key_version
            )));
        }

        for pair in self.recipients.windows(2) {
            if pair[0].recipient >= pair[1].recipient {
                return Err(CryptoError::InvalidKeySet(format!(
                    "recipients out of order or duplicated at {}",
                    pair[1].recipient
                )));
            }
        }

        for key in &self.recipients {
            if key.key_version != self.key_version {
                return Err(CryptoError::InvalidKeySet(format!(
                    "copy for {} is {} but set is {}",
                    key.recipient, key.key_version, self.key_version
                )));
            }
            if key.document_id != document_id {
                return Err(CryptoError::InvalidKeySet(format!(
                    "copy for {} names another document",
                    key.recipient
                )));
            }
            if key.recipient == self.custodian.recipient {
                return Err(CryptoError::InvalidKeySet(
                    "custodian listed as a recipient".into(),
                ));
            }
        }

        Ok(())
    }

    /// Deterministic digest of the whole set.
    ///
    /// Compared against the ledger's copy to confirm a publish whose
    /// acknowledgement was lost.
    pub fn digest(&self) -> Blake3Hash {
        let mut w = CanonicalWriter::with_domain(KEY_SET_DOMAIN);
        w.map(3).key(0).uint(self.key_version.get()).key(1);
        w.array(self.recipients.len());
        for key in &self.recipients {
            key.write_canonical(&mut w);
        }
        w.key(2);
        self.custodian.write_canonical(&mut w);
        w.end_map();
        Blake3Hash::hash(&w.finish())
    }

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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(doc: u8, recipient: u8, version: u64) -> WrappedKey {
        WrappedKey {
            document_id: DocumentId::from_bytes([doc; 32]),
            recipient: RecipientId::from_bytes([recipient; 32]),
            recipient_public: X25519PublicKey([recipient; 32]),
            key_version: KeyVersion(version),
            ephemeral_public: X25519PublicKey([0xEE; 32]),
            nonce: EncryptionNonce([0; 12]),
            ciphertext: vec![recipient; 48],
        }
    }

    #[test]
    fn test_new_sorts_recipients() {
        let set = WrappedKeySet::new(
            KeyVersion(1),
            vec![key(1, 9, 1), key(1, 3, 1), key(1, 5, 1)],
            key(1, 0xCC, 1),
        );
        let ids: Vec<_> = set.recipients.iter().map(|k| k.recipient.as_bytes()[0]).collect();
        assert_eq!(ids, vec![3, 5, 9]);
        assert!(set.contains(&RecipientId::from_bytes([5; 32])));
        assert!(!set.contains(&RecipientId::from_bytes([0xCC; 32])));
        set.check().unwrap();
    }

    #[test]
    fn test_check_rejects_duplicates() {
        let set = WrappedKeySet::new(
            KeyVersion(1),
            vec![key(1, 3, 1), key(1, 3, 1)],
            key(1, 0xCC, 1),
        );
        assert!(matches!(set.check(), Err(CryptoError::InvalidKeySet(_))));
    }

    #[test]
    fn test_check_rejects_mixed_versions() {
        let set = WrappedKeySet::new(
            KeyVersion(2),
            vec![key(1, 3, 2), key(1, 4, 1)],
            key(1, 0xCC, 2),
        );
        assert!(set.check().is_err());

        let stale_custodian =
            WrappedKeySet::new(KeyVersion(2), vec![key(1, 3, 2)], key(1, 0xCC, 1));
        assert!(stale_custodian.check().is_err());
    }

    #[test]
    fn test_check_rejects_foreign_document() {
        let set = WrappedKeySet::new(KeyVersion(1), vec![key(2, 3, 1)], key(1, 0xCC, 1));
        assert!(set.check().is_err());
    }

    #[test]
    fn test_digest_ignores_input_order() {
        let custodian = key(1, 0xCC, 1);
        let a = WrappedKeySet::new(
            KeyVersion(1),
            vec![key(1, 3, 1), key(1, 4, 1)],
            custodian.clone(),
        );
        let b = WrappedKeySet::new(KeyVersion(1), vec![key(1, 4, 1), key(1, 3, 1)], custodian);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_changes_with_content() {
        let a = WrappedKeySet::new(KeyVersion(1), vec![key(1, 3, 1)], key(1, 0xCC, 1));
        let mut b = a.clone();
        b.recipients[0].ciphertext[0] ^= 1;
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_cbor_roundtrip() {
        let set = WrappedKeySet::new(KeyVersion(4), vec![key(1, 3, 4)], key(1, 0xCC, 4));
        let bytes = set.to_bytes().unwrap();
        assert_eq!(WrappedKeySet::from_bytes(&bytes).unwrap(), set);
    }
}
