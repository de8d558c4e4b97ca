//! # MedVault Clients
//!
//! Interfaces to the external collaborators the vault depends on, each with
//! an in-memory implementation for tests:
//!
//! - [`ContentStore`] - content-addressed blob storage (`put` / `get`)
//! - [`Ledger`] - token minting, wrapped-key publication and role grants
//! - [`KeyDirectory`] - recipient id to X25519 public key
//!
//! The memory implementations share a [`FaultInjector`] so tests can make
//! calls fail, slow down, or (for the ledger) lose their acknowledgement.

pub mod content;
pub mod directory;
pub mod error;
pub mod faults;
pub mod ledger;

pub use content::memory::MemoryContentStore;
pub use content::ContentStore;
pub use directory::memory::MemoryKeyDirectory;
pub use directory::KeyDirectory;
pub use error::{ClientError, Result};
pub use faults::FaultInjector;
pub use ledger::memory::{MemoryLedger, RoleEvent};
pub use ledger::{Ledger, LedgerRecord, MintReceipt, Role};
