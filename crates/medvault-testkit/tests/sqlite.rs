//! The vault over an on-disk SQLite registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use medvault::{Collaborators, Custodian, Vault};
use medvault_core::KeyVersion;
use medvault_crypto::X25519StaticSecret;
use medvault_registry::{AccessRegistry, SqliteRegistry};
use medvault_testkit::{fast_config, init_tracing, VaultFixture};

const CUSTODIAN_SECRET: [u8; 32] = [0xC0; 32];

#[tokio::test]
async fn test_access_survives_reopen() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("registry.db");

    let fixture = VaultFixture::with_custodian(
        Arc::new(SqliteRegistry::open(&path)?),
        CUSTODIAN_SECRET,
        fast_config(),
    );
    let alice = fixture.party(1).await;
    let bob = fixture.party(2).await;
    let carol = fixture.party(3).await;
    fixture.start().await;

    let doc = fixture.store(&alice, b"surgical notes").await?.document_id;
    fixture.vault.grant(&alice.session, doc, bob.principal()).await?;
    fixture.vault.revoke(&bob.session, doc, alice.principal()).await?;
    fixture.stop().await;
    let before = fixture.vault.access_record(&doc).await?;

    // A second process opens the same file and keeps going.
    let reopened: Arc<dyn AccessRegistry> = Arc::new(SqliteRegistry::open(&path)?);
    assert_eq!(reopened.get(&doc).await?, before);
    assert_eq!(reopened.history(&doc).await?.len(), 1 + 2 + 1);

    let vault = Vault::new(
        Collaborators {
            registry: reopened,
            ..fixture.collaborators()
        },
        Custodian::from_secret(X25519StaticSecret::from_bytes(CUSTODIAN_SECRET)),
        fast_config(),
    );
    vault.agent().start().await;
    let outcome = vault.grant(&bob.session, doc, carol.principal()).await?;
    vault.agent().stop().await;

    assert_eq!(outcome.key_version, KeyVersion(4));
    assert_eq!(outcome.recipients, BTreeSet::from([bob.principal(), carol.principal()]));
    let plaintext = vault
        .open_document(&carol.principal(), &carol.secret, &doc)
        .await?;
    assert_eq!(plaintext, b"surgical notes");
    assert!(vault.verify_consistency(&doc).await?.is_consistent());
    Ok(())
}

#[tokio::test]
async fn test_rollback_in_sqlite() -> anyhow::Result<()> {
    let registry = Arc::new(SqliteRegistry::open_memory()?);
    let fixture = VaultFixture::with_registry(registry, fast_config());
    let alice = fixture.party(1).await;
    let bob = fixture.party(2).await;
    fixture.start().await;
    let doc = fixture.store(&alice, b"x").await?.document_id;

    fixture.ledger.faults().fail_next(100);
    assert!(fixture.vault.grant(&alice.session, doc, bob.principal()).await.is_err());
    fixture.ledger.faults().clear();

    let record = fixture.vault.access_record(&doc).await?;
    assert_eq!(record.current_key_version, KeyVersion::INITIAL);
    assert_eq!(fixture.registry.history(&doc).await?.len(), 1);
    fixture.stop().await;
    Ok(())
}
