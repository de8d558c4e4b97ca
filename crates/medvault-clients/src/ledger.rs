//! Ledger client.
//!
//! The ledger holds one token per document binding its owner, content
//! address and the currently published wrapped-key set. It also records role
//! grants, which the orchestrator consults for admin capability.
//!
//! Updates are version-checked: a key set is accepted only at exactly the
//! token's current version plus one, otherwise the call fails with
//! `StaleVersion`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use medvault_core::{ContentAddress, KeyVersion, RecipientId, TokenId, TxHash};
use medvault_crypto::WrappedKeySet;

use crate::error::Result;

/// Capabilities recorded on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May grant and revoke on any document.
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
        }
    }
}

/// Acknowledgement of a mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintReceipt {
    pub token_id: TokenId,
    pub tx_hash: TxHash,
}

/// A token's current on-ledger state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub token_id: TokenId,
    pub owner: RecipientId,
    pub content_address: ContentAddress,
    pub key_version: KeyVersion,
    pub keys: WrappedKeySet,
}

/// Remote ledger operations the vault depends on.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Mint a token for a newly stored document.
    async fn mint_record(
        &self,
        owner: &RecipientId,
        content_address: &ContentAddress,
        keys: &WrappedKeySet,
    ) -> Result<MintReceipt>;

    /// Publish a re-wrapped key set.
    ///
    /// Fails with `StaleVersion` unless `keys.key_version` is the token's
    /// current version plus one.
    async fn update_wrapped_keys(&self, token_id: TokenId, keys: &WrappedKeySet)
        -> Result<TxHash>;

    /// Read a token's current state.
    async fn read_record(&self, token_id: TokenId) -> Result<LedgerRecord>;

    /// Record that `account` holds `role`.
    async fn grant_role(&self, role: Role, account: &RecipientId) -> Result<TxHash>;

    /// Record that `account` no longer holds `role`.
    async fn revoke_role(&self, role: Role, account: &RecipientId) -> Result<TxHash>;

    /// Whether the role-grant record currently gives `account` the role.
    async fn has_role(&self, role: Role, account: &RecipientId) -> Result<bool>;
}

/// A simple in-memory ledger for testing.
///
/// Transactions are applied immediately; transaction hashes are derived
/// from a running counter so they are unique per call.
pub mod memory {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::sync::RwLock;
    use tracing::debug;

    use medvault_core::{Blake3Hash, CanonicalWriter};

    use crate::error::ClientError;
    use crate::faults::FaultInjector;

    /// One entry of the role-grant record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RoleEvent {
        pub role: Role,
        pub account: RecipientId,
        pub granted: bool,
    }

    #[derive(Default)]
    struct LedgerState {
        tokens: BTreeMap<TokenId, LedgerRecord>,
        roles: Vec<RoleEvent>,
        next_token: u64,
        tx_count: u64,
    }

    impl LedgerState {
        fn next_tx(&mut self, kind: &str, body: &[u8]) -> TxHash {
            self.tx_count += 1;
            let mut w = CanonicalWriter::new();
            w.array(3).uint(self.tx_count).text(kind).bytes(body);
            let hash = Blake3Hash::derive("medvault-memory-ledger-tx-v1", &w.finish());
            TxHash::from_bytes(hash.0)
        }
    }

    #[derive(Default)]
    pub struct MemoryLedger {
        state: RwLock<LedgerState>,
        faults: FaultInjector,
    }

    impl MemoryLedger {
        pub fn new() -> Self {
            Self::default()
        }

        /// Injected failures for this ledger.
        pub fn faults(&self) -> &FaultInjector {
            &self.faults
        }

        /// The full role-grant record, oldest first.
        pub async fn role_events(&self) -> Vec<RoleEvent> {
            self.state.read().await.roles.clone()
        }

        /// Number of transactions applied (successful or with dropped ack).
        pub async fn tx_count(&self) -> u64 {
            self.state.read().await.tx_count
        }

        async fn record_role(
            &self,
            role: Role,
            account: &RecipientId,
            granted: bool,
        ) -> Result<TxHash> {
            if self.faults.before_call().await {
                return Err(ClientError::LedgerUnavailable("injected fault".into()));
            }
            let mut state = self.state.write().await;
            state.roles.push(RoleEvent {
                role,
                account: *account,
                granted,
            });
            let kind = if granted { "grant_role" } else { "revoke_role" };
            let tx = state.next_tx(kind, account.as_bytes());
            debug!(role = role.as_str(), account = %account, granted, "recorded role event");
            self.ack(tx)
        }

        fn ack(&self, tx: TxHash) -> Result<TxHash> {
            if self.faults.take_dropped_ack() {
                return Err(ClientError::LedgerUnavailable("acknowledgement lost".into()));
            }
            Ok(tx)
        }
    }

    #[async_trait]
    impl Ledger for MemoryLedger {
        async fn mint_record(
            &self,
            owner: &RecipientId,
            content_address: &ContentAddress,
            keys: &WrappedKeySet,
        ) -> Result<MintReceipt> {
            if self.faults.before_call().await {
                return Err(ClientError::LedgerUnavailable("injected fault".into()));
            }
            keys.check()
                .map_err(|e| ClientError::InvalidRecord(e.to_string()))?;
            if keys.key_version != KeyVersion::INITIAL {
                return Err(ClientError::InvalidRecord(format!(
                    "mint must carry {}, got {}",
                    KeyVersion::INITIAL,
                    keys.key_version
                )));
            }

            let mut state = self.state.write().await;
            state.next_token += 1;
            let token_id = TokenId(state.next_token);
            state.tokens.insert(
                token_id,
                LedgerRecord {
                    token_id,
                    owner: *owner,
                    content_address: *content_address,
                    key_version: keys.key_version,
                    keys: keys.clone(),
                },
            );
            let tx_hash = state.next_tx("mint", keys.digest().as_bytes());
            debug!(token = %token_id, owner = %owner, "minted token");

            let tx_hash = self.ack(tx_hash)?;
            Ok(MintReceipt { token_id, tx_hash })
        }

        async fn update_wrapped_keys(
            &self,
            token_id: TokenId,
            keys: &WrappedKeySet,
        ) -> Result<TxHash> {
            if self.faults.before_call().await {
                return Err(ClientError::LedgerUnavailable("injected fault".into()));
            }
            keys.check()
                .map_err(|e| ClientError::InvalidRecord(e.to_string()))?;

            let mut state = self.state.write().await;
            let record = state
                .tokens
                .get_mut(&token_id)
                .ok_or(ClientError::TokenNotFound(token_id))?;

            if record.key_version.next().ok() != Some(keys.key_version) {
                return Err(ClientError::StaleVersion {
                    token_id,
                    current: record.key_version,
                    attempted: keys.key_version,
                });
            }

            record.key_version = keys.key_version;
            record.keys = keys.clone();
            let tx_hash = state.next_tx("update_wrapped_keys", keys.digest().as_bytes());
            debug!(token = %token_id, version = %keys.key_version, "published key set");
            self.ack(tx_hash)
        }

        async fn read_record(&self, token_id: TokenId) -> Result<LedgerRecord> {
            if self.faults.before_call().await {
                return Err(ClientError::LedgerUnavailable("injected fault".into()));
            }
            self.state
                .read()
                .await
                .tokens
                .get(&token_id)
                .cloned()
                .ok_or(ClientError::TokenNotFound(token_id))
        }

        async fn grant_role(&self, role: Role, account: &RecipientId) -> Result<TxHash> {
            self.record_role(role, account, true).await
        }

        async fn revoke_role(&self, role: Role, account: &RecipientId) -> Result<TxHash> {
            self.record_role(role, account, false).await
        }

        async fn has_role(&self, role: Role, account: &RecipientId) -> Result<bool> {
            if self.faults.before_call().await {
                return Err(ClientError::LedgerUnavailable("injected fault".into()));
            }
            // Replay the role-grant record; the latest event for the pair wins.
            let state = self.state.read().await;
            Ok(state
                .roles
                .iter()
                .rev()
                .find(|e| e.role == role && e.account == *account)
                .map_or(false, |e| e.granted))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryLedger;
    use super::*;
    use crate::error::ClientError;
    use medvault_core::DocumentId;
    use medvault_crypto::{EncryptionNonce, WrappedKey, X25519PublicKey};

    fn key(recipient: u8, version: u64) -> WrappedKey {
        WrappedKey {
            document_id: DocumentId::from_bytes([1; 32]),
            recipient: RecipientId::from_bytes([recipient; 32]),
            recipient_public: X25519PublicKey::from_bytes([recipient; 32]),
            key_version: KeyVersion(version),
            ephemeral_public: X25519PublicKey::from_bytes([9; 32]),
            nonce: EncryptionNonce([0; 12]),
            ciphertext: vec![recipient; 48],
        }
    }

    fn set(version: u64, recipients: &[u8]) -> WrappedKeySet {
        WrappedKeySet::new(
            KeyVersion(version),
            recipients.iter().map(|r| key(*r, version)).collect(),
            key(0xCC, version),
        )
    }

    async fn minted(ledger: &MemoryLedger) -> TokenId {
        ledger
            .mint_record(
                &RecipientId::from_bytes([1; 32]),
                &ContentAddress::of(b"doc"),
                &set(1, &[1]),
            )
            .await
            .unwrap()
            .token_id
    }

    #[tokio::test]
    async fn test_mint_and_read() {
        let ledger = MemoryLedger::new();
        let token = minted(&ledger).await;

        let record = ledger.read_record(token).await.unwrap();
        assert_eq!(record.key_version, KeyVersion(1));
        assert_eq!(record.keys, set(1, &[1]));
        assert_eq!(record.content_address, ContentAddress::of(b"doc"));
    }

    #[tokio::test]
    async fn test_update_requires_next_version() {
        let ledger = MemoryLedger::new();
        let token = minted(&ledger).await;

        assert!(matches!(
            ledger.update_wrapped_keys(token, &set(3, &[1])).await,
            Err(ClientError::StaleVersion { .. })
        ));

        let a = ledger.update_wrapped_keys(token, &set(2, &[1, 2])).await.unwrap();
        assert!(matches!(
            ledger.update_wrapped_keys(token, &set(2, &[1, 2])).await,
            Err(ClientError::StaleVersion { .. })
        ));
        let b = ledger.update_wrapped_keys(token, &set(3, &[2])).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(ledger.read_record(token).await.unwrap().key_version, KeyVersion(3));
    }

    #[tokio::test]
    async fn test_dropped_ack_still_applies() {
        let ledger = MemoryLedger::new();
        let token = minted(&ledger).await;

        ledger.faults().drop_ack_next(1);
        let err = ledger
            .update_wrapped_keys(token, &set(2, &[1, 2]))
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let record = ledger.read_record(token).await.unwrap();
        assert_eq!(record.keys.digest(), set(2, &[1, 2]).digest());
    }

    #[tokio::test]
    async fn test_role_record_replays_latest_event() {
        let ledger = MemoryLedger::new();
        let admin = RecipientId::from_bytes([7; 32]);

        assert!(!ledger.has_role(Role::Admin, &admin).await.unwrap());
        ledger.grant_role(Role::Admin, &admin).await.unwrap();
        assert!(ledger.has_role(Role::Admin, &admin).await.unwrap());
        ledger.revoke_role(Role::Admin, &admin).await.unwrap();
        assert!(!ledger.has_role(Role::Admin, &admin).await.unwrap());

        assert_eq!(ledger.role_events().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let ledger = MemoryLedger::new();
        assert_eq!(
            ledger.read_record(TokenId(42)).await.unwrap_err(),
            ClientError::TokenNotFound(TokenId(42))
        );
    }
}
