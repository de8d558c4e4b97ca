//! Signed grant and revoke requests.
//!
//! An [`AccessEvent`] asks the orchestrator to add (`Grant`) or remove
//! (`Revoke`) a recipient on a document. The requester signs the canonical
//! encoding of every field except the signature, so the orchestrator can
//! authenticate `requested_by` without any shared user table.

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalWriter;
use crate::crypto::{Ed25519Signature, Keypair};
use crate::error::Result;
use crate::types::{DocumentId, RecipientId};

/// Domain tag prepended to every signed event message.
pub const EVENT_DOMAIN: &[u8] = b"medvault-event-v1:";

mod keys {
    pub const KIND: u64 = 0;
    pub const DOCUMENT: u64 = 1;
    pub const TARGET: u64 = 2;
    pub const REQUESTED_BY: u64 = 3;
    pub const TIMESTAMP: u64 = 4;
}

/// What an access event asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    Grant = 1,
    Revoke = 2,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Grant => "grant",
            EventKind::Revoke => "revoke",
        }
    }
}

/// A signed request to change a document's recipient set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub kind: EventKind,
    pub document_id: DocumentId,
    /// The recipient being granted or revoked.
    pub target: RecipientId,
    /// Who is asking. Must match the signing key.
    pub requested_by: RecipientId,
    /// Requester-claimed time (Unix ms).
    pub timestamp: i64,
    pub signature: Ed25519Signature,
}

impl AccessEvent {
    /// Build and sign an event with the requester's keypair.
    pub fn signed(
        keypair: &Keypair,
        kind: EventKind,
        document_id: DocumentId,
        target: RecipientId,
        timestamp: i64,
    ) -> Self {
        let mut event = Self {
            kind,
            document_id,
            target,
            requested_by: keypair.recipient_id(),
            timestamp,
            signature: Ed25519Signature::ZERO,
        };
        event.signature = keypair.sign(&event.signing_bytes());
        event
    }

    /// The exact bytes covered by the signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut w = CanonicalWriter::with_domain(EVENT_DOMAIN);
        w.map(5)
            .key(keys::KIND)
            .uint(self.kind as u64)
            .key(keys::DOCUMENT)
            .bytes(self.document_id.as_bytes())
            .key(keys::TARGET)
            .bytes(self.target.as_bytes())
            .key(keys::REQUESTED_BY)
            .bytes(self.requested_by.as_bytes())
            .key(keys::TIMESTAMP)
            .int(self.timestamp)
            .end_map();
        w.finish()
    }

    /// Check that `requested_by` signed this event.
    pub fn verify(&self) -> Result<()> {
        self.requested_by
            .verify(&self.signing_bytes(), &self.signature)
    }

    pub fn is_grant(&self) -> bool {
        self.kind == EventKind::Grant
    }

    pub fn is_revoke(&self) -> bool {
        self.kind == EventKind::Revoke
    }
}
