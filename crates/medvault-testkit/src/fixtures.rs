//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;
use std::time::Duration;

use medvault::{
    Collaborators, Custodian, OrchestratorConfig, Result, RetryPolicy, StoredDocument, Vault,
    VaultConfig,
};
use medvault_clients::{MemoryContentStore, MemoryKeyDirectory, MemoryLedger};
use medvault_core::{DocumentId, Keypair, RecipientId, Session};
use medvault_crypto::{X25519PublicKey, X25519StaticSecret};
use medvault_registry::{AccessRegistry, MemoryRegistry};

/// A party: a signing session and the X25519 secret its keys are wrapped to.
pub struct Party {
    pub session: Session,
    pub secret: X25519StaticSecret,
}

impl Party {
    /// Deterministic party; both keys are derived from `seed`.
    pub fn from_seed(seed: u8) -> Self {
        let mut signing = [seed; 32];
        signing[0] = 0x5E;
        Self {
            session: Session::new(Keypair::from_seed(&signing)),
            secret: X25519StaticSecret::from_bytes([seed; 32]),
        }
    }

    pub fn random() -> Self {
        Self {
            session: Session::new(Keypair::generate()),
            secret: X25519StaticSecret::generate(),
        }
    }

    pub fn principal(&self) -> RecipientId {
        self.session.principal()
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }
}

/// Create `count` deterministic parties with seeds `1..=count`.
pub fn multi_party(count: u8) -> Vec<Party> {
    (1..=count).map(Party::from_seed).collect()
}

/// Config with millisecond backoff so failure tests stay fast.
pub fn fast_config() -> VaultConfig {
    VaultConfig::default().with_orchestrator(
        OrchestratorConfig::default()
            .with_call_timeout(Duration::from_secs(2))
            .with_retry(
                RetryPolicy::default()
                    .with_initial_backoff(Duration::from_millis(1))
                    .with_max_backoff(Duration::from_millis(4)),
            ),
    )
}

/// A vault over in-memory collaborators.
pub struct VaultFixture {
    pub vault: Vault,
    pub registry: Arc<dyn AccessRegistry>,
    pub content: Arc<MemoryContentStore>,
    pub ledger: Arc<MemoryLedger>,
    pub directory: Arc<MemoryKeyDirectory>,
}

impl VaultFixture {
    /// Memory registry, fast retries, fresh custodian.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(MemoryRegistry::new()), fast_config())
    }

    /// Use the given registry (e.g. SQLite) and config.
    pub fn with_registry(registry: Arc<dyn AccessRegistry>, config: VaultConfig) -> Self {
        Self::build(registry, Custodian::generate(), config)
    }

    /// Use the given registry with a custodian restored from `secret`.
    pub fn with_custodian(
        registry: Arc<dyn AccessRegistry>,
        secret: [u8; 32],
        config: VaultConfig,
    ) -> Self {
        let custodian = Custodian::from_secret(X25519StaticSecret::from_bytes(secret));
        Self::build(registry, custodian, config)
    }

    fn build(registry: Arc<dyn AccessRegistry>, custodian: Custodian, config: VaultConfig) -> Self {
        let content = Arc::new(MemoryContentStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let directory = Arc::new(MemoryKeyDirectory::new());
        let collaborators = Collaborators {
            registry: registry.clone(),
            content: content.clone(),
            ledger: ledger.clone(),
            directory: directory.clone(),
        };
        Self {
            vault: Vault::new(collaborators, custodian, config),
            registry,
            content,
            ledger,
            directory,
        }
    }

    /// A second vault process sharing this fixture's collaborators.
    pub fn sibling(&self, custodian: Custodian, config: VaultConfig) -> Vault {
        Vault::new(self.collaborators(), custodian, config)
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            registry: self.registry.clone(),
            content: self.content.clone(),
            ledger: self.ledger.clone(),
            directory: self.directory.clone(),
        }
    }

    /// Create party `seed` and register its wrapping key.
    pub async fn party(&self, seed: u8) -> Party {
        let party = Party::from_seed(seed);
        self.register(&party).await;
        party
    }

    pub async fn register(&self, party: &Party) {
        self.directory
            .register(party.principal(), party.public_key())
            .await;
    }

    pub async fn start(&self) {
        self.vault.agent().start().await;
    }

    pub async fn stop(&self) {
        self.vault.agent().stop().await;
    }

    pub async fn store(&self, owner: &Party, plaintext: &[u8]) -> Result<StoredDocument> {
        self.vault.store_document(&owner.session, plaintext).await
    }

    pub async fn open(&self, party: &Party, document_id: &DocumentId) -> Result<Vec<u8>> {
        self.vault
            .open_document(&party.principal(), &party.secret, document_id)
            .await
    }
}

impl Default for VaultFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parties_are_distinct_and_stable() {
        let parties = multi_party(3);
        assert_ne!(parties[0].principal(), parties[1].principal());
        assert_ne!(parties[1].public_key(), parties[2].public_key());
        assert_eq!(Party::from_seed(2).principal(), parties[1].principal());
    }

    #[tokio::test]
    async fn test_fixture_round_trip() {
        let fixture = VaultFixture::new();
        let alice = fixture.party(1).await;

        let stored = fixture.store(&alice, b"vaccination record").await.unwrap();
        assert_eq!(
            fixture.open(&alice, &stored.document_id).await.unwrap(),
            b"vaccination record"
        );
    }
}
