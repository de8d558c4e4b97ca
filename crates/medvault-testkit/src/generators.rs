//! Proptest generators for property-based testing.

use proptest::prelude::*;

use medvault_core::{AccessEvent, DocumentId, EventKind, KeyVersion, Keypair, RecipientId};
use medvault_crypto::X25519StaticSecret;

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a recipient id that is a valid verifying key.
pub fn recipient_id() -> impl Strategy<Value = RecipientId> {
    keypair().prop_map(|kp| kp.recipient_id())
}

/// Generate a random DocumentId.
pub fn document_id() -> impl Strategy<Value = DocumentId> {
    any::<[u8; 32]>().prop_map(DocumentId::from_bytes)
}

/// Generate an X25519 secret.
pub fn x25519_secret() -> impl Strategy<Value = X25519StaticSecret> {
    any::<[u8; 32]>().prop_map(X25519StaticSecret::from_bytes)
}

/// Generate a key version (1-indexed).
pub fn key_version() -> impl Strategy<Value = KeyVersion> {
    (1u64..=u64::MAX).prop_map(KeyVersion)
}

/// Generate an EventKind.
pub fn event_kind() -> impl Strategy<Value = EventKind> {
    prop_oneof![Just(EventKind::Grant), Just(EventKind::Revoke)]
}

/// Generate a timestamp, including pre-epoch values.
pub fn timestamp() -> impl Strategy<Value = i64> {
    i64::MIN / 2..=i64::MAX / 2
}

/// Generate document contents of up to `max_len` bytes.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Access operations for scenario properties: `(grant?, party seed)`.
pub fn access_ops(parties: u8, max_len: usize) -> impl Strategy<Value = Vec<(bool, u8)>> {
    prop::collection::vec((any::<bool>(), 1..=parties), 0..=max_len)
}

/// Parameters for generating an access event.
#[derive(Debug, Clone)]
pub struct AccessEventParams {
    pub keypair: Keypair,
    pub kind: EventKind,
    pub document_id: DocumentId,
    pub target: RecipientId,
    pub timestamp: i64,
}

impl Arbitrary for AccessEventParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (keypair(), event_kind(), document_id(), recipient_id(), timestamp())
            .prop_map(|(keypair, kind, document_id, target, timestamp)| AccessEventParams {
                keypair,
                kind,
                document_id,
                target,
                timestamp,
            })
            .boxed()
    }
}

/// Build a signed event from parameters.
pub fn event_from_params(params: &AccessEventParams) -> AccessEvent {
    AccessEvent::signed(
        &params.keypair,
        params.kind,
        params.document_id,
        params.target,
        params.timestamp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn signed_events_verify(params: AccessEventParams) {
            let event = event_from_params(&params);
            prop_assert!(event.verify().is_ok());
            prop_assert_eq!(event.requested_by, params.keypair.recipient_id());
        }

        #[test]
        fn signing_bytes_are_deterministic(params: AccessEventParams) {
            let a = event_from_params(&params);
            let b = event_from_params(&params);
            prop_assert_eq!(a.signing_bytes(), b.signing_bytes());
            prop_assert_eq!(a.signature, b.signature);
        }

        #[test]
        fn retargeted_events_fail_verification(params: AccessEventParams, other in recipient_id()) {
            prop_assume!(other != params.target);
            let mut event = event_from_params(&params);
            event.target = other;
            prop_assert!(event.verify().is_err());
        }
    }
}
