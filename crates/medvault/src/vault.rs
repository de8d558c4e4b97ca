//! The vault facade.
//!
//! Ties the codec, the collaborators and the agent together behind the
//! entry points an application calls: store a document, open it, change its
//! recipients, and inspect the result.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use medvault_core::{
    ContentAddress, DocumentId, KeyVersion, RecipientId, Session, TokenId, TxHash,
};
use medvault_crypto::{EncryptedDocument, KeyWrapCodec, WrappedKey, X25519StaticSecret};
use medvault_registry::{AccessRecord, Genesis};

use crate::agent::Agent;
use crate::config::VaultConfig;
use crate::custodian::Custodian;
use crate::error::{Result, VaultError};
use crate::orchestrator::{Collaborators, ReencryptionOrchestrator, RewrapOutcome};
use crate::retry::{Collaborator, Retrier};

/// Result of storing a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub document_id: DocumentId,
    pub content_address: ContentAddress,
    pub token_id: TokenId,
    pub tx_hash: TxHash,
    pub key_version: KeyVersion,
}

/// Registry and ledger views of one document, side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub document_id: DocumentId,
    pub registry_version: KeyVersion,
    pub ledger_version: KeyVersion,
    pub registry_recipients: BTreeSet<RecipientId>,
    pub ledger_recipients: BTreeSet<RecipientId>,
    /// Whether both sides hold the same content address.
    pub content_matches: bool,
    /// Whether both sides hold byte-identical key sets.
    pub digests_match: bool,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.registry_version == self.ledger_version
            && self.registry_recipients == self.ledger_recipients
            && self.content_matches
            && self.digests_match
    }
}

/// Encrypted document storage with re-wrappable access.
pub struct Vault {
    collaborators: Collaborators,
    codec: KeyWrapCodec,
    custodian: Arc<Custodian>,
    agent: Agent,
    retry: Retrier,
}

impl Vault {
    /// Assemble a vault. The agent starts idle; call `agent().start()`.
    pub fn new(collaborators: Collaborators, custodian: Custodian, config: VaultConfig) -> Self {
        let custodian = Arc::new(custodian);
        let orchestrator = Arc::new(ReencryptionOrchestrator::new(
            collaborators.clone(),
            custodian.clone(),
            &config.orchestrator,
        ));
        let retry = Retrier::new(
            config.orchestrator.retry.clone(),
            config.orchestrator.call_timeout,
        );
        Self {
            collaborators,
            codec: KeyWrapCodec::new(),
            custodian,
            agent: Agent::new(orchestrator, config.orchestrator),
            retry,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn custodian_id(&self) -> RecipientId {
        self.custodian.id()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Documents
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt `plaintext`, store it, mint its token and register it at v1
    /// with the session's principal as the sole recipient.
    pub async fn store_document(
        &self,
        session: &Session,
        plaintext: &[u8],
    ) -> Result<StoredDocument> {
        let owner = session.principal();
        let owner_ref = &owner;

        let directory = &self.collaborators.directory;
        let owner_public = self
            .retry
            .call(Collaborator::Directory, "get_public_key", move || {
                directory.get_public_key(owner_ref)
            })
            .await?;

        let key = self.codec.generate_content_key()?;
        let envelope = Bytes::from(self.codec.encrypt_document(&key, plaintext)?.to_bytes()?);

        let content = &self.collaborators.content;
        let content_address = self
            .retry
            .call(Collaborator::Storage, "put_document", move || {
                content.put(envelope.clone())
            })
            .await?;

        let document_id = DocumentId::derive(&owner, &content_address);
        if self.collaborators.registry.contains(&document_id).await? {
            return Err(VaultError::DuplicateDocument(document_id));
        }

        let keys = self.custodian.seal(
            &self.codec,
            &key,
            document_id,
            KeyVersion::INITIAL,
            &[(owner, owner_public)],
        )?;
        drop(key);

        let ledger = &self.collaborators.ledger;
        let address_ref = &content_address;
        let keys_ref = &keys;
        let receipt = self
            .retry
            .call(Collaborator::Ledger, "mint_record", move || {
                ledger.mint_record(owner_ref, address_ref, keys_ref)
            })
            .await?;

        self.collaborators
            .registry
            .create(Genesis {
                document_id,
                content_address,
                token_id: receipt.token_id,
                owner,
                keys,
            })
            .await?;

        info!(
            document = %document_id,
            owner = %owner,
            token = %receipt.token_id,
            size = plaintext.len(),
            "document stored"
        );
        Ok(StoredDocument {
            document_id,
            content_address,
            token_id: receipt.token_id,
            tx_hash: receipt.tx_hash,
            key_version: KeyVersion::INITIAL,
        })
    }

    /// Decrypt a document with the principal's current wrapped key.
    pub async fn open_document(
        &self,
        principal: &RecipientId,
        secret: &X25519StaticSecret,
        document_id: &DocumentId,
    ) -> Result<Vec<u8>> {
        let record = self.collaborators.registry.get(document_id).await?;
        let Some(wrapped) = record.wrapped_key_for(principal) else {
            warn!(document = %document_id, principal = %principal, "open by non-recipient");
            return Err(VaultError::Unauthorized(format!(
                "{} is not a recipient of {}",
                principal, document_id
            )));
        };
        let key = self.codec.unwrap(wrapped, secret)?;

        let content = &self.collaborators.content;
        let address = &record.content_address;
        let blob = self
            .retry
            .call(Collaborator::Storage, "get_document", move || content.get(address))
            .await?;

        let document = EncryptedDocument::from_bytes(&blob)?;
        Ok(self.codec.decrypt_document(&key, &document)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Access
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign and submit a grant, then wait for it.
    pub async fn grant(
        &self,
        session: &Session,
        document_id: DocumentId,
        target: RecipientId,
    ) -> Result<RewrapOutcome> {
        self.agent.submit_grant(session.grant(document_id, target)).await.await
    }

    /// Sign and submit a revoke, then wait for it.
    pub async fn revoke(
        &self,
        session: &Session,
        document_id: DocumentId,
        target: RecipientId,
    ) -> Result<RewrapOutcome> {
        self.agent.submit_revoke(session.revoke(document_id, target)).await.await
    }

    pub async fn access_record(&self, document_id: &DocumentId) -> Result<AccessRecord> {
        Ok(self.collaborators.registry.get(document_id).await?)
    }

    pub async fn recipients(&self, document_id: &DocumentId) -> Result<BTreeSet<RecipientId>> {
        Ok(self.collaborators.registry.list_recipients(document_id).await?)
    }

    /// Every wrapped key ever issued for the document, oldest version first.
    pub async fn key_history(&self, document_id: &DocumentId) -> Result<Vec<WrappedKey>> {
        Ok(self.collaborators.registry.history(document_id).await?)
    }

    /// Compare the registry record with the ledger token.
    pub async fn verify_consistency(&self, document_id: &DocumentId) -> Result<ConsistencyReport> {
        let record = self.collaborators.registry.get(document_id).await?;

        let ledger = &self.collaborators.ledger;
        let token_id = record.token_id;
        let published = self
            .retry
            .call(Collaborator::Ledger, "read_record", move || {
                ledger.read_record(token_id)
            })
            .await?;

        let report = ConsistencyReport {
            document_id: *document_id,
            registry_version: record.current_key_version,
            ledger_version: published.key_version,
            registry_recipients: record.recipient_ids(),
            ledger_recipients: published.keys.recipient_ids(),
            content_matches: record.content_address == published.content_address,
            digests_match: record.key_set().digest() == published.keys.digest(),
        };
        if !report.is_consistent() {
            warn!(
                document = %document_id,
                registry_version = %report.registry_version,
                ledger_version = %report.ledger_version,
                "registry and ledger disagree"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use medvault_clients::ContentStore;

    #[tokio::test]
    async fn test_store_then_open() {
        let h = Harness::new().await;
        let stored = h
            .vault
            .store_document(&h.owner, b"blood panel 2026-03-02")
            .await
            .unwrap();

        assert_eq!(stored.key_version, KeyVersion::INITIAL);
        assert_eq!(
            h.vault.recipients(&stored.document_id).await.unwrap(),
            BTreeSet::from([h.owner.principal()])
        );

        let plaintext = h
            .vault
            .open_document(&h.owner.principal(), &Harness::secret(1), &stored.document_id)
            .await
            .unwrap();
        assert_eq!(plaintext, b"blood panel 2026-03-02");
        assert!(h.vault.verify_consistency(&stored.document_id).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_store_requires_registered_owner() {
        let h = Harness::new().await;
        let stranger = Session::new(medvault_core::Keypair::from_seed(&[77; 32]));
        let result = h.vault.store_document(&stranger, b"x").await;
        assert!(matches!(result, Err(VaultError::UnknownRecipient(_))));
    }

    #[tokio::test]
    async fn test_open_by_non_recipient() {
        let h = Harness::new().await;
        let bob = h.party(2).await;
        let doc = h.store(b"x").await;

        let result = h
            .vault
            .open_document(&bob.principal(), &Harness::secret(2), &doc)
            .await;
        assert!(matches!(result, Err(VaultError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_open_with_wrong_secret() {
        let h = Harness::new().await;
        let doc = h.store(b"x").await;

        let result = h
            .vault
            .open_document(&h.owner.principal(), &Harness::secret(9), &doc)
            .await;
        assert!(matches!(result, Err(VaultError::UnwrapFailure)));
    }

    #[tokio::test]
    async fn test_open_detects_tampered_blob() {
        let h = Harness::new().await;
        let stored = h.vault.store_document(&h.owner, b"x").await.unwrap();

        let blob = h.content.get(&stored.content_address).await.unwrap();
        let mut envelope = EncryptedDocument::from_bytes(&blob).unwrap();
        let last = envelope.ciphertext.len() - 1;
        envelope.ciphertext[last] ^= 1;
        h.content
            .corrupt(&stored.content_address, Bytes::from(envelope.to_bytes().unwrap()))
            .await;

        let result = h
            .vault
            .open_document(&h.owner.principal(), &Harness::secret(1), &stored.document_id)
            .await;
        assert!(matches!(result, Err(VaultError::TamperedCiphertext)));
    }

    #[tokio::test]
    async fn test_mint_retries_transient_failures() {
        let h = Harness::new().await;
        h.ledger.faults().fail_next(2);

        let stored = h.vault.store_document(&h.owner, b"x").await.unwrap();
        assert_eq!(stored.token_id, TokenId(1));
        assert_eq!(h.ledger.faults().calls(), 3);
    }
}
