//! # MedVault Core
//!
//! Pure primitives shared by every MedVault crate: strongly typed identifiers,
//! Ed25519 signing identities, signed access events, and deterministic CBOR
//! encoding.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`DocumentId`] - Identifier of a stored document (derived from owner and address)
//! - [`RecipientId`] - A party's Ed25519 verifying key
//! - [`ContentAddress`] - Address of a blob in content-addressed storage
//! - [`KeyVersion`] - Monotonic counter of a document's wrapped-key set
//! - [`AccessEvent`] - A signed grant or revoke request
//! - [`Session`] - Explicit per-caller context that signs events
//!
//! ## Canonicalization
//!
//! Everything that is signed or hashed is encoded with [`canonical::CanonicalWriter`],
//! a deterministic CBOR subset (integer map keys in ascending order, definite
//! lengths, shortest integer encodings).

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod event;
pub mod session;
pub mod types;

pub use canonical::CanonicalWriter;
pub use crypto::{Blake3Hash, Ed25519Signature, Keypair};
pub use error::{CoreError, Result};
pub use event::{AccessEvent, EventKind};
pub use session::Session;
pub use types::{ContentAddress, DocumentId, KeyVersion, RecipientId, TokenId, TxHash};

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Timestamp for a newly signed event: wall-clock milliseconds, but strictly
/// greater than any value returned before in this process.
///
/// Two otherwise identical events signed back to back therefore still differ,
/// which keeps a deliberate repeat apart from a replayed copy.
pub fn event_timestamp() -> i64 {
    use std::sync::atomic::{AtomicI64, Ordering};
    static LAST: AtomicI64 = AtomicI64::new(i64::MIN);

    let now = now_millis();
    let mut last = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(seen) => last = seen,
        }
    }
}
