//! Golden test vectors for deterministic verification.
//!
//! These vectors pin the canonical encodings that are signed or bound into
//! wrapped keys, so every implementation produces identical bytes.

use serde::Serialize;

use medvault_core::{AccessEvent, DocumentId, EventKind, KeyVersion, Keypair, RecipientId};
use medvault_crypto::WrapContext;

/// A signed access event with its expected encoding and signature.
#[derive(Debug, Clone, Serialize)]
pub struct EventVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Ed25519 seed of the requester.
    #[serde(with = "hex_bytes")]
    pub seed: [u8; 32],
    pub kind: EventKind,
    /// Byte repeated across the document id.
    pub document: u8,
    /// Byte repeated across the target id.
    pub target: u8,
    pub timestamp: i64,
    /// Expected requester id (hex).
    pub expected_requested_by: &'static str,
    /// Expected signing bytes (hex).
    pub expected_signing_bytes: &'static str,
    /// Expected Ed25519 signature (hex).
    pub expected_signature: &'static str,
}

/// A wrap context with its expected encoding.
#[derive(Debug, Clone, Serialize)]
pub struct ContextVector {
    pub name: &'static str,
    pub document: u8,
    pub recipient: u8,
    pub key_version: u64,
    pub expected_bytes: &'static str,
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }
}

/// Get all event vectors.
pub fn all_event_vectors() -> Vec<EventVector> {
    vec![
        EventVector {
            name: "grant at 2026-01-01",
            seed: [0x42; 32],
            kind: EventKind::Grant,
            document: 0x11,
            target: 0x22,
            timestamp: 1767225600000,
            expected_requested_by: "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12",
            expected_signing_bytes: "6d65647661756c742d6576656e742d76313aa500010158201111111111111111111111111111111111111111111111111111111111111111025820222222222222222222222222222222222222222222222222222222222222222203582021\
52f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12041b0000019b76daa800",
            expected_signature: "642e246e325f71b278e970a96ad969e5340b864d680d654cbc3c2e65e061c68d81b75328cb561a92561a9581c80e1fd4d838a06f855a2a4be52ea36f39f8c30b",
        },
        EventVector {
            name: "revoke at epoch",
            seed: [0x07; 32],
            kind: EventKind::Revoke,
            document: 0x33,
            target: 0x44,
            timestamp: 0,
            expected_requested_by: "ea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c",
            expected_signing_bytes: "6d65647661756c742d6576656e742d76313aa5000201582033333333333333333333333333333333333333333333333333333333333333330258204444444444444444444444444444444444444444444444444444444444444444035820ea\
4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c0400",
            expected_signature: "2a1792e6474c556700c3765e90375ecb33c6acfbec862adb9c81466e81e8a39dc08cfd8a36f8d997469babffd1d24aaf2e6f9f9dc4e912ca0af05a537deeec01",
        },
        EventVector {
            name: "revoke with negative timestamp",
            seed: [0x07; 32],
            kind: EventKind::Revoke,
            document: 0x33,
            target: 0x44,
            timestamp: -1,
            expected_requested_by: "ea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c",
            expected_signing_bytes: "6d65647661756c742d6576656e742d76313aa5000201582033333333333333333333333333333333333333333333333333333333333333330258204444444444444444444444444444444444444444444444444444444444444444035820ea\
4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c0420",
            expected_signature: "5f43bb509ae64de5692f3c1a39cfbab92f374ae9781ce8d2f11c190874058d49e3071e08ec9ad32c06ed532da16f1d896888ac140b6f61d720d02265f091a80e",
        },
    ]
}

/// Get all wrap-context vectors.
pub fn all_context_vectors() -> Vec<ContextVector> {
    vec![
        ContextVector {
            name: "small version",
            document: 0x11,
            recipient: 0x22,
            key_version: 3,
            expected_bytes: "6d65647661756c742d777261702d636f6e746578742d76313aa30058201111111111111111111111111111111111111111111111111111111111111111015820222222222222222222222222222222222222222222222222222222222222222202\
03",
        },
        ContextVector {
            name: "two-byte version",
            document: 0x11,
            recipient: 0x22,
            key_version: 300,
            expected_bytes: "6d65647661756c742d777261702d636f6e746578742d76313aa30058201111111111111111111111111111111111111111111111111111111111111111015820222222222222222222222222222222222222222222222222222222222222222202\
19012c",
        },
    ]
}

/// Build the event a vector describes.
pub fn event_from_vector(vector: &EventVector) -> AccessEvent {
    AccessEvent::signed(
        &Keypair::from_seed(&vector.seed),
        vector.kind,
        DocumentId::from_bytes([vector.document; 32]),
        RecipientId::from_bytes([vector.target; 32]),
        vector.timestamp,
    )
}

/// Build the wrap context a vector describes.
pub fn context_from_vector(vector: &ContextVector) -> WrapContext {
    WrapContext::new(
        DocumentId::from_bytes([vector.document; 32]),
        RecipientId::from_bytes([vector.recipient; 32]),
        KeyVersion(vector.key_version),
    )
}

/// Check every vector; returns `(name, matches, actual hex)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let events = all_event_vectors().into_iter().map(|v| {
        let event = event_from_vector(&v);
        let bytes = hex::encode(event.signing_bytes());
        let matches = bytes == v.expected_signing_bytes
            && event.requested_by.to_hex() == v.expected_requested_by
            && event.signature.to_hex() == v.expected_signature;
        (v.name.to_string(), matches, bytes)
    });
    let contexts = all_context_vectors().into_iter().map(|v| {
        let bytes = hex::encode(context_from_vector(&v).to_bytes());
        (v.name.to_string(), bytes == v.expected_bytes, bytes)
    });
    events.chain(contexts).collect()
}

/// All vectors as JSON, for other implementations to consume.
pub fn vectors_json() -> serde_json::Value {
    serde_json::json!({
        "events": all_event_vectors(),
        "wrap_contexts": all_context_vectors(),
    })
}
