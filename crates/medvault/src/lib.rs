//! # MedVault
//!
//! Encrypted medical document storage with re-wrappable access control.
//!
//! ## Overview
//!
//! A document is encrypted once under a random content key. The content key
//! is wrapped to each recipient's X25519 public key, and those wrapped keys
//! are what access means:
//!
//! - **Storing**: the ciphertext goes to a content-addressed store, a ledger
//!   token records the wrapped keys at version 1, and the registry records
//!   the binding
//! - **Granting / revoking**: the orchestrator re-wraps the unchanged content
//!   key for the new recipient set at the next version and commits it to the
//!   registry and the ledger together
//! - **Opening**: a recipient unwraps their current key and decrypts
//!
//! ## Key Concepts
//!
//! - **Key version**: bumps exactly once per re-wrap. Only the current
//!   version is authoritative; older wrapped keys are kept for audit.
//! - **Custodian**: the vault's own X25519 identity. Every version carries a
//!   copy wrapped to it, so re-wraps never need a recipient's secret.
//! - **Agent**: the start/stop-able background worker that processes
//!   submitted events.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use medvault::{Collaborators, Custodian, Vault, VaultConfig};
//! use medvault::clients::{MemoryContentStore, MemoryKeyDirectory, MemoryLedger};
//! use medvault::core::{Keypair, Session};
//! use medvault::crypto::X25519StaticSecret;
//! use medvault::registry::SqliteRegistry;
//!
//! async fn example() {
//!     let directory = Arc::new(MemoryKeyDirectory::new());
//!     let collaborators = Collaborators {
//!         registry: Arc::new(SqliteRegistry::open("registry.db").unwrap()),
//!         content: Arc::new(MemoryContentStore::new()),
//!         ledger: Arc::new(MemoryLedger::new()),
//!         directory: directory.clone(),
//!     };
//!     let vault = Vault::new(collaborators, Custodian::generate(), VaultConfig::default());
//!     vault.agent().start().await;
//!
//!     let alice = Session::new(Keypair::generate());
//!     let alice_secret = X25519StaticSecret::generate();
//!     directory.register(alice.principal(), alice_secret.public_key()).await;
//!
//!     let stored = vault.store_document(&alice, b"discharge summary").await.unwrap();
//!     let plaintext = vault
//!         .open_document(&alice.principal(), &alice_secret, &stored.document_id)
//!         .await
//!         .unwrap();
//!
//!     vault.agent().stop().await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `medvault::core` - Identifiers, signing, access events, sessions
//! - `medvault::crypto` - Content keys, key wrapping, document envelopes
//! - `medvault::registry` - AccessRegistry with SQLite and memory backends
//! - `medvault::clients` - Content store, ledger and key directory clients

pub mod agent;
pub mod config;
pub mod custodian;
pub mod error;
pub mod orchestrator;
pub mod vault;

mod locks;
mod replay;
mod retry;

// Re-export component crates
pub use medvault_clients as clients;
pub use medvault_core as core;
pub use medvault_crypto as crypto;
pub use medvault_registry as registry;

// Re-export main types for convenience
pub use agent::{Agent, AgentState, RewrapTicket};
pub use config::{OrchestratorConfig, RetryPolicy, VaultConfig};
pub use custodian::Custodian;
pub use error::{Result, VaultError};
pub use orchestrator::{Collaborators, ReencryptionOrchestrator, RewrapOutcome};
pub use vault::{ConsistencyReport, StoredDocument, Vault};
