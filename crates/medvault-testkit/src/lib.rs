//! # MedVault Testkit
//!
//! Testing utilities for MedVault.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known event and wrap-context encodings with expected
//!   bytes and signatures, for cross-platform verification
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A vault over in-memory collaborators plus named parties
//!
//! ## Golden Vectors
//!
//! ```rust
//! use medvault_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, _) in verify_all_vectors() {
//!     assert!(ok, "{name}");
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use medvault_testkit::fixtures::VaultFixture;
//!
//! async fn example() {
//!     let fixture = VaultFixture::new();
//!     let alice = fixture.party(1).await;
//!     let bob = fixture.party(2).await;
//!     fixture.start().await;
//!
//!     let stored = fixture.store(&alice, b"allergy list").await.unwrap();
//!     fixture
//!         .vault
//!         .grant(&alice.session, stored.document_id, bob.principal())
//!         .await
//!         .unwrap();
//!     let plaintext = fixture.open(&bob, &stored.document_id).await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{fast_config, multi_party, Party, VaultFixture};
pub use generators::{event_from_params, AccessEventParams};
pub use vectors::{all_context_vectors, all_event_vectors, verify_all_vectors, EventVector};

/// Install a test-writer `tracing` subscriber once per process.
///
/// Safe to call from every test; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}
