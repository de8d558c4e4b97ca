//! In-memory implementation of the AccessRegistry trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{btree_map::Entry, BTreeMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use medvault_core::{ContentAddress, DocumentId, KeyVersion, RecipientId, TokenId};
use medvault_crypto::{WrappedKey, WrappedKeySet};

use crate::error::{RegistryError, Result};
use crate::record::{validate_rewrap, validate_rollback, AccessRecord, Genesis};
use crate::traits::AccessRegistry;

/// In-memory registry implementation.
///
/// All data is lost when the registry is dropped. Thread-safe via RwLock.
pub struct MemoryRegistry {
    inner: RwLock<MemoryRegistryInner>,
}

#[derive(Default)]
struct MemoryRegistryInner {
    documents: BTreeMap<DocumentId, StoredDocument>,
}

struct StoredDocument {
    content_address: ContentAddress,
    token_id: TokenId,
    owner: RecipientId,
    current: KeyVersion,
    /// Every retained key set, by version.
    sets: BTreeMap<KeyVersion, WrappedKeySet>,
}

impl StoredDocument {
    fn record(&self, document_id: DocumentId) -> Result<AccessRecord> {
        let keys = self.sets.get(&self.current).cloned().ok_or_else(|| {
            RegistryError::InvariantViolation(format!(
                "{} has no key set at {}",
                document_id, self.current
            ))
        })?;
        Ok(AccessRecord::from_parts(
            document_id,
            self.content_address,
            self.token_id,
            self.owner,
            keys,
        ))
    }
}

impl MemoryRegistry {
    /// Create a new empty in-memory registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryRegistryInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryRegistryInner>> {
        self.inner.read().map_err(|_| RegistryError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryRegistryInner>> {
        self.inner.write().map_err(|_| RegistryError::LockPoisoned)
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccessRegistry for MemoryRegistry {
    async fn create(&self, genesis: Genesis) -> Result<AccessRecord> {
        genesis.validate()?;
        let mut inner = self.write()?;

        match inner.documents.entry(genesis.document_id) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateDocument(genesis.document_id)),
            Entry::Vacant(slot) => {
                let stored = slot.insert(StoredDocument {
                    content_address: genesis.content_address,
                    token_id: genesis.token_id,
                    owner: genesis.owner,
                    current: KeyVersion::INITIAL,
                    sets: BTreeMap::from([(KeyVersion::INITIAL, genesis.keys)]),
                });
                stored.record(genesis.document_id)
            }
        }
    }

    async fn get(&self, document_id: &DocumentId) -> Result<AccessRecord> {
        let inner = self.read()?;
        inner
            .documents
            .get(document_id)
            .ok_or(RegistryError::NotFound(*document_id))?
            .record(*document_id)
    }

    async fn apply_rewrap(
        &self,
        document_id: &DocumentId,
        keys: &WrappedKeySet,
    ) -> Result<AccessRecord> {
        let mut inner = self.write()?;
        let stored = inner
            .documents
            .get_mut(document_id)
            .ok_or(RegistryError::NotFound(*document_id))?;

        validate_rewrap(document_id, stored.current, keys)?;

        stored.sets.insert(keys.key_version, keys.clone());
        stored.current = keys.key_version;
        stored.record(*document_id)
    }

    async fn rollback(
        &self,
        document_id: &DocumentId,
        version: KeyVersion,
    ) -> Result<AccessRecord> {
        let mut inner = self.write()?;
        let stored = inner
            .documents
            .get_mut(document_id)
            .ok_or(RegistryError::NotFound(*document_id))?;

        let restored = validate_rollback(document_id, stored.current, version)?;
        if !stored.sets.contains_key(&restored) {
            return Err(RegistryError::InvariantViolation(format!(
                "{} has no key set at {} to restore",
                document_id, restored
            )));
        }

        stored.sets.remove(&version);
        stored.current = restored;
        stored.record(*document_id)
    }

    async fn history(&self, document_id: &DocumentId) -> Result<Vec<WrappedKey>> {
        let inner = self.read()?;
        let stored = inner
            .documents
            .get(document_id)
            .ok_or(RegistryError::NotFound(*document_id))?;

        Ok(stored
            .sets
            .values()
            .flat_map(|set| set.recipients.iter().cloned())
            .collect())
    }

    async fn list_documents(&self) -> Result<Vec<DocumentId>> {
        Ok(self.read()?.documents.keys().copied().collect())
    }
}
