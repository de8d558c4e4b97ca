//! The re-wrap state machine for grant and revoke events.
//!
//! A re-wrap moves a document from key version N to N+1:
//!
//! 1. Verify the event, lock the document and refuse stale or replayed events
//! 2. Read the registry record and authorize the requester
//! 3. Resolve the new recipient set
//! 4. Open the custodian copy of the content key and seal it again at N+1
//! 5. Mirror the key set to the content store as a manifest
//! 6. Apply it to the registry
//! 7. Publish it to the ledger, or roll the registry back to N
//!
//! The document ciphertext is never touched. Registry and ledger both end at
//! N+1 or both stay at N; the only exception is a failed rollback, which is
//! reported as [`VaultError::RollbackFailed`].

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use medvault_clients::{ContentStore, KeyDirectory, Ledger, Role};
use medvault_core::{
    AccessEvent, ContentAddress, DocumentId, EventKind, KeyVersion, RecipientId, TokenId, TxHash,
};
use medvault_crypto::{KeyWrapCodec, WrappedKeySet, X25519PublicKey};
use medvault_registry::{AccessRecord, AccessRegistry};

use crate::config::OrchestratorConfig;
use crate::custodian::Custodian;
use crate::error::{Result, VaultError};
use crate::locks::DocumentLocks;
use crate::replay::ReplayGuard;
use crate::retry::{Collaborator, Retrier};

/// The services a vault talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn AccessRegistry>,
    pub content: Arc<dyn ContentStore>,
    pub ledger: Arc<dyn Ledger>,
    pub directory: Arc<dyn KeyDirectory>,
}

/// Result of a processed access event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrapOutcome {
    pub document_id: DocumentId,
    /// Version after the event.
    pub key_version: KeyVersion,
    /// Active recipients after the event.
    pub recipients: BTreeSet<RecipientId>,
    /// Publish transaction. `None` when nothing changed, or when the publish
    /// was confirmed by reading the ledger after a lost acknowledgement.
    pub tx_hash: Option<TxHash>,
    /// Where the key-set manifest was mirrored.
    pub manifest: Option<ContentAddress>,
    /// Whether a new version was committed.
    pub changed: bool,
}

impl RewrapOutcome {
    fn unchanged(record: &AccessRecord) -> Self {
        Self {
            document_id: record.document_id,
            key_version: record.current_key_version,
            recipients: record.recipient_ids(),
            tx_hash: None,
            manifest: None,
            changed: false,
        }
    }
}

/// Processes access events against the registry, content store and ledger.
pub struct ReencryptionOrchestrator {
    collaborators: Collaborators,
    codec: KeyWrapCodec,
    custodian: Arc<Custodian>,
    locks: DocumentLocks,
    replay: ReplayGuard,
    retry: Retrier,
}

impl ReencryptionOrchestrator {
    pub fn new(
        collaborators: Collaborators,
        custodian: Arc<Custodian>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            collaborators,
            codec: KeyWrapCodec::new(),
            custodian,
            locks: DocumentLocks::new(),
            replay: ReplayGuard::new(config.max_event_age),
            retry: Retrier::new(config.retry.clone(), config.call_timeout),
        }
    }

    /// Dispatch on the event kind.
    pub async fn handle(&self, event: &AccessEvent) -> Result<RewrapOutcome> {
        match event.kind {
            EventKind::Grant => self.handle_grant(event).await,
            EventKind::Revoke => self.handle_revoke(event).await,
        }
    }

    /// Add `event.target` to the document's recipients.
    pub async fn handle_grant(&self, event: &AccessEvent) -> Result<RewrapOutcome> {
        check_event(event, EventKind::Grant)?;
        let _guard = self.locks.acquire(event.document_id).await;
        self.replay.check(event).await?;

        let outcome = self.grant(event).await?;
        self.replay.record(event).await;
        Ok(outcome)
    }

    /// Remove `event.target` from the document's recipients.
    pub async fn handle_revoke(&self, event: &AccessEvent) -> Result<RewrapOutcome> {
        check_event(event, EventKind::Revoke)?;
        let _guard = self.locks.acquire(event.document_id).await;
        self.replay.check(event).await?;

        let outcome = self.revoke(event).await?;
        self.replay.record(event).await;
        Ok(outcome)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Steps
    // ─────────────────────────────────────────────────────────────────────────

    async fn grant(&self, event: &AccessEvent) -> Result<RewrapOutcome> {
        let record = self.collaborators.registry.get(&event.document_id).await?;
        self.authorize(event, &record).await?;

        if record.is_active(&event.target) {
            info!(
                document = %event.document_id,
                target = %event.target,
                version = %record.current_key_version,
                "grant for active recipient, nothing to do"
            );
            return Ok(RewrapOutcome::unchanged(&record));
        }

        let directory = &self.collaborators.directory;
        let target = &event.target;
        let target_public = self
            .retry
            .call(Collaborator::Directory, "get_public_key", move || {
                directory.get_public_key(target)
            })
            .await?;

        let mut recipients = current_recipients(&record);
        recipients.push((event.target, target_public));
        self.commit(event, &record, &recipients).await
    }

    async fn revoke(&self, event: &AccessEvent) -> Result<RewrapOutcome> {
        let record = self.collaborators.registry.get(&event.document_id).await?;
        self.authorize(event, &record).await?;

        if !record.is_active(&event.target) {
            return Err(VaultError::UnknownRecipient(event.target));
        }
        if record.recipients.len() == 1 {
            warn!(
                document = %event.document_id,
                target = %event.target,
                "refusing to revoke the last recipient"
            );
            return Err(VaultError::CannotRevokeLastRecipient(event.document_id));
        }

        let recipients: Vec<_> = current_recipients(&record)
            .into_iter()
            .filter(|(recipient, _)| *recipient != event.target)
            .collect();
        self.commit(event, &record, &recipients).await
    }

    /// Active recipients may change access; so may ledger admins.
    async fn authorize(&self, event: &AccessEvent, record: &AccessRecord) -> Result<()> {
        if record.is_active(&event.requested_by) {
            return Ok(());
        }

        let ledger = &self.collaborators.ledger;
        let account = &event.requested_by;
        let admin = self
            .retry
            .call(Collaborator::Ledger, "has_role", move || {
                ledger.has_role(Role::Admin, account)
            })
            .await?;
        if admin {
            debug!(requester = %event.requested_by, "authorized by admin role");
            return Ok(());
        }

        warn!(
            document = %event.document_id,
            requester = %event.requested_by,
            kind = event.kind.as_str(),
            "rejected unauthorized access event"
        );
        Err(VaultError::Unauthorized(format!(
            "{} is neither a recipient of {} nor an admin",
            event.requested_by, event.document_id
        )))
    }

    async fn commit(
        &self,
        event: &AccessEvent,
        record: &AccessRecord,
        recipients: &[(RecipientId, X25519PublicKey)],
    ) -> Result<RewrapOutcome> {
        let document_id = record.document_id;
        let version = record.current_key_version.next()?;

        let keys = {
            let key = self.custodian.open(&self.codec, &record.custodian)?;
            self.custodian
                .seal(&self.codec, &key, document_id, version, recipients)?
        };

        let content = &self.collaborators.content;
        let manifest_bytes = Bytes::from(keys.to_bytes()?);
        let manifest = self
            .retry
            .call(Collaborator::Storage, "put_manifest", move || {
                content.put(manifest_bytes.clone())
            })
            .await?;

        let applied = self
            .collaborators
            .registry
            .apply_rewrap(&document_id, &keys)
            .await?;

        match self.publish(record.token_id, &keys).await {
            Ok(tx_hash) => {
                info!(
                    document = %document_id,
                    kind = event.kind.as_str(),
                    target = %event.target,
                    version = %version,
                    recipients = applied.recipients.len(),
                    "re-wrap committed"
                );
                Ok(RewrapOutcome {
                    document_id,
                    key_version: version,
                    recipients: applied.recipient_ids(),
                    tx_hash,
                    manifest: Some(manifest),
                    changed: true,
                })
            }
            Err(publish) => {
                let registry = &self.collaborators.registry;
                match registry.rollback(&document_id, version).await {
                    Ok(restored) => {
                        warn!(
                            document = %document_id,
                            version = %restored.current_key_version,
                            error = %publish,
                            "publish failed, registry rolled back"
                        );
                        Err(publish)
                    }
                    Err(rollback) => {
                        error!(
                            document = %document_id,
                            version = %version,
                            publish_error = %publish,
                            rollback_error = %rollback,
                            "publish failed and registry rollback failed"
                        );
                        Err(VaultError::RollbackFailed {
                            document_id,
                            version,
                            publish: publish.to_string(),
                            rollback: rollback.to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Publish `keys` to the ledger.
    ///
    /// Once an attempt has failed transiently its write may have landed
    /// without an acknowledgement. From then on a `StaleVersion` answer, or
    /// running out of attempts, leads to reading the ledger back: if it
    /// already holds exactly this key set the publish counts as done.
    async fn publish(&self, token_id: TokenId, keys: &WrappedKeySet) -> Result<Option<TxHash>> {
        let ledger = &self.collaborators.ledger;
        let attempts = self.retry.attempts();
        let mut uncertain = false;
        let mut attempt = 1;

        loop {
            let result = self
                .retry
                .once(
                    Collaborator::Ledger,
                    "update_wrapped_keys",
                    ledger.update_wrapped_keys(token_id, keys),
                )
                .await;

            match result {
                Ok(tx_hash) => return Ok(Some(tx_hash)),
                Err(e @ VaultError::StaleVersion { .. }) if uncertain => {
                    return self.confirm(token_id, keys, e).await;
                }
                Err(e) if e.is_transient() => {
                    uncertain = true;
                    if attempt >= attempts {
                        return self.confirm(token_id, keys, e).await;
                    }
                    warn!(token = %token_id, attempt, error = %e, "publish failed, retrying");
                    self.retry.backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn confirm(
        &self,
        token_id: TokenId,
        keys: &WrappedKeySet,
        cause: VaultError,
    ) -> Result<Option<TxHash>> {
        let ledger = &self.collaborators.ledger;
        let read = self
            .retry
            .call(Collaborator::Ledger, "read_record", move || {
                ledger.read_record(token_id)
            })
            .await;

        match read {
            Ok(record)
                if record.key_version == keys.key_version
                    && record.keys.digest() == keys.digest() =>
            {
                info!(
                    token = %token_id,
                    version = %keys.key_version,
                    "publish confirmed by read-back"
                );
                Ok(None)
            }
            Ok(record) => {
                debug!(
                    token = %token_id,
                    ledger_version = %record.key_version,
                    "ledger does not hold the published key set"
                );
                Err(cause)
            }
            Err(e) => {
                warn!(token = %token_id, error = %e, "could not read ledger to confirm publish");
                Err(cause)
            }
        }
    }
}

fn check_event(event: &AccessEvent, expected: EventKind) -> Result<()> {
    if let Err(e) = event.verify() {
        warn!(
            document = %event.document_id,
            requester = %event.requested_by,
            "rejected access event with bad signature"
        );
        return Err(e.into());
    }
    if event.kind != expected {
        return Err(VaultError::InvalidEvent(format!(
            "expected a {} event, got {}",
            expected.as_str(),
            event.kind.as_str()
        )));
    }
    Ok(())
}

/// Existing recipients keep the public key their current wrap was made for.
fn current_recipients(record: &AccessRecord) -> Vec<(RecipientId, X25519PublicKey)> {
    record
        .recipients
        .values()
        .map(|wrapped| (wrapped.recipient, wrapped.recipient_public))
        .collect()
}
