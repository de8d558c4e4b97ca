//! Access records and the rules every mutation must keep.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use medvault_core::{ContentAddress, DocumentId, KeyVersion, RecipientId, TokenId};
use medvault_crypto::{WrappedKey, WrappedKeySet};

use crate::error::{RegistryError, Result};

/// Everything needed to register a freshly stored document at version 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genesis {
    pub document_id: DocumentId,
    pub content_address: ContentAddress,
    pub token_id: TokenId,
    pub owner: RecipientId,
    /// The owner's copy plus the custodian copy, at [`KeyVersion::INITIAL`].
    pub keys: WrappedKeySet,
}

impl Genesis {
    /// Check the genesis key set: version 1, exactly the owner as recipient.
    pub fn validate(&self) -> Result<()> {
        validate_key_set(&self.document_id, &self.keys)?;
        if self.keys.key_version != KeyVersion::INITIAL {
            return Err(RegistryError::InvariantViolation(format!(
                "genesis key set is {}",
                self.keys.key_version
            )));
        }
        if self.keys.recipient_ids() != BTreeSet::from([self.owner]) {
            return Err(RegistryError::InvariantViolation(
                "genesis key set must hold exactly the owner".into(),
            ));
        }
        Ok(())
    }
}

/// The authoritative access state of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub document_id: DocumentId,
    pub content_address: ContentAddress,
    pub token_id: TokenId,
    pub owner: RecipientId,
    pub current_key_version: KeyVersion,
    /// Active recipients and their copy at `current_key_version`.
    pub recipients: BTreeMap<RecipientId, WrappedKey>,
    pub custodian: WrappedKey,
}

impl AccessRecord {
    /// Build the record for the given header fields and active key set.
    pub(crate) fn from_parts(
        document_id: DocumentId,
        content_address: ContentAddress,
        token_id: TokenId,
        owner: RecipientId,
        keys: WrappedKeySet,
    ) -> Self {
        Self {
            document_id,
            content_address,
            token_id,
            owner,
            current_key_version: keys.key_version,
            recipients: keys
                .recipients
                .into_iter()
                .map(|k| (k.recipient, k))
                .collect(),
            custodian: keys.custodian,
        }
    }

    /// The active recipient set.
    pub fn recipient_ids(&self) -> BTreeSet<RecipientId> {
        self.recipients.keys().copied().collect()
    }

    pub fn is_active(&self, recipient: &RecipientId) -> bool {
        self.recipients.contains_key(recipient)
    }

    /// The current-version copy held by `recipient`.
    pub fn wrapped_key_for(&self, recipient: &RecipientId) -> Option<&WrappedKey> {
        self.recipients.get(recipient)
    }

    /// The active keys as a publishable set.
    pub fn key_set(&self) -> WrappedKeySet {
        WrappedKeySet::new(
            self.current_key_version,
            self.recipients.values().cloned().collect(),
            self.custodian.clone(),
        )
    }
}

/// Check a key set about to become a document's active set.
pub(crate) fn validate_key_set(document_id: &DocumentId, keys: &WrappedKeySet) -> Result<()> {
    keys.check()
        .map_err(|e| RegistryError::InvariantViolation(e.to_string()))?;

    if keys.is_empty() {
        return Err(RegistryError::InvariantViolation(
            "recipient set must not be empty".into(),
        ));
    }
    if keys.document_id() != *document_id {
        return Err(RegistryError::InvariantViolation(format!(
            "key set belongs to {}, not {}",
            keys.document_id(),
            document_id
        )));
    }
    Ok(())
}

/// Check that `keys` may replace the set at `current`.
pub(crate) fn validate_rewrap(
    document_id: &DocumentId,
    current: KeyVersion,
    keys: &WrappedKeySet,
) -> Result<()> {
    let expected = current
        .next()
        .map_err(|e| RegistryError::InvariantViolation(e.to_string()))?;
    if keys.key_version != expected {
        return Err(RegistryError::VersionConflict {
            document_id: *document_id,
            current,
            attempted: keys.key_version,
        });
    }
    validate_key_set(document_id, keys)
}

/// Check that the set at `version` may be discarded.
pub(crate) fn validate_rollback(
    document_id: &DocumentId,
    current: KeyVersion,
    version: KeyVersion,
) -> Result<KeyVersion> {
    if current != version {
        return Err(RegistryError::VersionConflict {
            document_id: *document_id,
            current,
            attempted: version,
        });
    }
    version.prev().ok_or_else(|| {
        RegistryError::InvariantViolation("cannot roll back the initial version".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{genesis, rewrap};

    #[test]
    fn test_genesis_validates() {
        genesis(1).validate().unwrap();
    }

    #[test]
    fn test_genesis_must_hold_only_owner() {
        let mut g = genesis(1);
        g.keys = rewrap(&g, 1, &[1, 2]);
        assert!(matches!(
            g.validate(),
            Err(RegistryError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_genesis_must_start_at_initial_version() {
        let mut g = genesis(1);
        g.keys = rewrap(&g, 2, &[1]);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_record_key_set_roundtrip() {
        let g = genesis(7);
        let record = AccessRecord::from_parts(
            g.document_id,
            g.content_address,
            g.token_id,
            g.owner,
            g.keys.clone(),
        );
        assert_eq!(record.key_set(), g.keys);
        assert!(record.wrapped_key_for(&g.owner).is_some());
    }

    #[test]
    fn test_rollback_rules() {
        let id = DocumentId::from_bytes([1; 32]);
        assert_eq!(
            validate_rollback(&id, KeyVersion(3), KeyVersion(3)).unwrap(),
            KeyVersion(2)
        );
        assert!(validate_rollback(&id, KeyVersion(3), KeyVersion(2)).is_err());
        assert!(validate_rollback(&id, KeyVersion(1), KeyVersion(1)).is_err());
    }
}
