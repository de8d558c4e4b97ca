//! # MedVault Registry
//!
//! The authoritative record of who holds a usable key for each document.
//! Provides a trait-based interface with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`AccessRegistry`] - The async trait for all registry operations
//! - [`SqliteRegistry`] - SQLite-based persistent registry
//! - [`MemoryRegistry`] - In-memory registry for tests
//! - [`AccessRecord`] - A document's current version and active wrapped keys
//! - [`Genesis`] - The version-1 state of a newly stored document
//!
//! ## Usage
//!
//! ```rust,no_run
//! use medvault_registry::{AccessRegistry, SqliteRegistry};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let registry = SqliteRegistry::open("registry.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let registry = SqliteRegistry::open_memory().unwrap();
//!
//!     let documents = registry.list_documents().await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Compare-and-swap versions**: a re-wrap must carry exactly `current + 1`
//! - **Whole-set replacement**: the active set and version change together
//! - **Retained history**: superseded keys stay readable for audit
//! - **Rollback**: only the newest, unconfirmed version can be discarded

pub mod error;
pub mod memory;
pub mod migration;
pub mod record;
pub mod sqlite;
pub mod traits;

pub use error::{RegistryError, Result};
pub use memory::MemoryRegistry;
pub use record::{AccessRecord, Genesis};
pub use sqlite::SqliteRegistry;
pub use traits::AccessRegistry;
