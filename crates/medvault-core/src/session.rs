//! Explicit caller context.
//!
//! A [`Session`] is handed to every operation that acts on behalf of a
//! party. It owns the party's signing key and produces signed events; there
//! is no process-wide table of users or credentials.

use crate::crypto::Keypair;
use crate::event::{AccessEvent, EventKind};
use crate::event_timestamp;
use crate::types::{DocumentId, RecipientId};

/// The identity a caller acts as.
#[derive(Debug, Clone)]
pub struct Session {
    keypair: Keypair,
}

impl Session {
    /// Open a session for an existing signing identity.
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// The party this session acts as.
    pub fn principal(&self) -> RecipientId {
        self.keypair.recipient_id()
    }

    /// Sign a request to give `target` access to `document_id`.
    pub fn grant(&self, document_id: DocumentId, target: RecipientId) -> AccessEvent {
        self.event(EventKind::Grant, document_id, target, event_timestamp())
    }

    /// Sign a request to remove `target` from `document_id`.
    pub fn revoke(&self, document_id: DocumentId, target: RecipientId) -> AccessEvent {
        self.event(EventKind::Revoke, document_id, target, event_timestamp())
    }

    /// Sign an event with an explicit timestamp.
    pub fn event(
        &self,
        kind: EventKind,
        document_id: DocumentId,
        target: RecipientId,
        timestamp: i64,
    ) -> AccessEvent {
        AccessEvent::signed(&self.keypair, kind, document_id, target, timestamp)
    }
}
