//! Key wrapping codec.
//!
//! Wrapping seals a content key to a recipient with an ephemeral X25519
//! agreement. The shared secret, both public keys and the canonical
//! [`WrapContext`] feed a Blake3 key derivation; the derived key seals the
//! content key with ChaCha20-Poly1305, using the context as associated data.
//!
//! Unwrapping never reveals why it failed. A wrong secret, a tampered copy,
//! a relabelled context and a degenerate ephemeral key all produce
//! [`CryptoError::UnwrapFailure`], and all of them run the full AEAD.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use crate::crypto::{ContentKey, EncryptionNonce, X25519PublicKey, X25519StaticSecret};
use crate::envelope::{EncryptedDocument, EncryptionFormat};
use crate::error::{CryptoError, Result};
use crate::wrapped::{WrapContext, WrappedKey};

/// Blake3 derive-key context for wrap keys.
const WRAP_KEY_CONTEXT: &str = "medvault-key-wrap-v1";

/// Seals content keys to recipients and encrypts documents.
///
/// Stateless; every call draws fresh randomness from the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyWrapCodec;

impl KeyWrapCodec {
    pub fn new() -> Self {
        Self
    }

    /// Generate a fresh 256-bit content key.
    pub fn generate_content_key(&self) -> Result<ContentKey> {
        ContentKey::random()
    }

    /// Seal `key` to `recipient_public` under `context`.
    ///
    /// Fails with `InvalidPublicKey` when the public key is a low-order
    /// point (the agreement would not depend on our ephemeral secret).
    pub fn wrap(
        &self,
        key: &ContentKey,
        recipient_public: &X25519PublicKey,
        context: WrapContext,
    ) -> Result<WrappedKey> {
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = X25519PublicKey::from(PublicKey::from(&ephemeral));

        let shared = ephemeral.diffie_hellman(&recipient_public.to_dalek());
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey);
        }

        let aad = context.to_bytes();
        let wrap_key =
            derive_wrap_key(shared.as_bytes(), &ephemeral_public, recipient_public, &aad);

        let nonce = EncryptionNonce::generate()?;
        let ciphertext = cipher(&wrap_key)
            .encrypt(
                Nonce::from_slice(nonce.as_bytes()),
                Payload {
                    msg: key.as_bytes(),
                    aad: &aad,
                },
            )
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;

        Ok(WrappedKey {
            document_id: context.document_id,
            recipient: context.recipient,
            recipient_public: *recipient_public,
            key_version: context.key_version,
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Open a wrapped key with the recipient's secret.
    pub fn unwrap(&self, wrapped: &WrappedKey, secret: &X25519StaticSecret) -> Result<ContentKey> {
        let shared = secret.0.diffie_hellman(&wrapped.ephemeral_public.to_dalek());
        let contributory = shared.was_contributory();

        let aad = wrapped.context().to_bytes();
        let wrap_key = derive_wrap_key(
            shared.as_bytes(),
            &wrapped.ephemeral_public,
            &wrapped.recipient_public,
            &aad,
        );

        let opened = cipher(&wrap_key)
            .decrypt(
                Nonce::from_slice(wrapped.nonce.as_bytes()),
                Payload {
                    msg: &wrapped.ciphertext,
                    aad: &aad,
                },
            )
            .map(Zeroizing::new);

        match opened {
            Ok(bytes) if contributory && bytes.len() == ContentKey::LEN => {
                let mut arr = Zeroizing::new([0u8; 32]);
                arr.copy_from_slice(&bytes);
                Ok(ContentKey::from_bytes(*arr))
            }
            _ => Err(CryptoError::UnwrapFailure),
        }
    }

    /// Encrypt a document under its content key.
    pub fn encrypt_document(
        &self,
        key: &ContentKey,
        plaintext: &[u8],
    ) -> Result<EncryptedDocument> {
        let nonce = EncryptionNonce::generate()?;
        let ciphertext = cipher(key.as_bytes())
            .encrypt(Nonce::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;

        Ok(EncryptedDocument {
            format: EncryptionFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt a document. Fails with `TamperedCiphertext` on any
    /// authentication failure.
    pub fn decrypt_document(
        &self,
        key: &ContentKey,
        document: &EncryptedDocument,
    ) -> Result<Vec<u8>> {
        match document.format {
            EncryptionFormat::ChaCha20Poly1305 => cipher(key.as_bytes())
                .decrypt(
                    Nonce::from_slice(document.nonce.as_bytes()),
                    document.ciphertext.as_slice(),
                )
                .map_err(|_| CryptoError::TamperedCiphertext),
        }
    }
}

fn cipher(key: &[u8; 32]) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key))
}

fn derive_wrap_key(
    shared: &[u8; 32],
    ephemeral_public: &X25519PublicKey,
    recipient_public: &X25519PublicKey,
    context: &[u8],
) -> Zeroizing<[u8; 32]> {
    let mut hasher = blake3::Hasher::new_derive_key(WRAP_KEY_CONTEXT);
    hasher.update(shared);
    hasher.update(ephemeral_public.as_bytes());
    hasher.update(recipient_public.as_bytes());
    hasher.update(context);
    Zeroizing::new(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use medvault_core::{DocumentId, KeyVersion, RecipientId};
    use proptest::prelude::*;

    fn context(version: u64) -> WrapContext {
        WrapContext::new(
            DocumentId::from_bytes([1; 32]),
            RecipientId::from_bytes([2; 32]),
            KeyVersion(version),
        )
    }

    #[test]
    fn test_wrap_unwrap_recovers_key() {
        let codec = KeyWrapCodec::new();
        let secret = X25519StaticSecret::generate();
        let key = codec.generate_content_key().unwrap();

        let wrapped = codec.wrap(&key, &secret.public_key(), context(1)).unwrap();
        let opened = codec.unwrap(&wrapped, &secret).unwrap();

        assert_eq!(opened.as_bytes(), key.as_bytes());
        assert_eq!(wrapped.key_version, KeyVersion(1));
    }

    #[test]
    fn test_wrong_secret_is_unwrap_failure() {
        let codec = KeyWrapCodec::new();
        let secret = X25519StaticSecret::generate();
        let other = X25519StaticSecret::generate();
        let key = codec.generate_content_key().unwrap();

        let wrapped = codec.wrap(&key, &secret.public_key(), context(1)).unwrap();
        assert_eq!(
            codec.unwrap(&wrapped, &other).unwrap_err(),
            CryptoError::UnwrapFailure
        );
    }

    #[test]
    fn test_relabelled_version_is_unwrap_failure() {
        let codec = KeyWrapCodec::new();
        let secret = X25519StaticSecret::generate();
        let key = codec.generate_content_key().unwrap();

        let mut wrapped = codec.wrap(&key, &secret.public_key(), context(1)).unwrap();
        wrapped.key_version = KeyVersion(2);
        assert_eq!(
            codec.unwrap(&wrapped, &secret).unwrap_err(),
            CryptoError::UnwrapFailure
        );
    }

    #[test]
    fn test_low_order_public_key_is_rejected() {
        let codec = KeyWrapCodec::new();
        let key = codec.generate_content_key().unwrap();
        let identity = X25519PublicKey::from_bytes([0; 32]);

        assert_eq!(
            codec.wrap(&key, &identity, context(1)).unwrap_err(),
            CryptoError::InvalidPublicKey
        );
    }

    #[test]
    fn test_degenerate_ephemeral_is_unwrap_failure() {
        let codec = KeyWrapCodec::new();
        let secret = X25519StaticSecret::generate();
        let key = codec.generate_content_key().unwrap();

        let mut wrapped = codec.wrap(&key, &secret.public_key(), context(1)).unwrap();
        wrapped.ephemeral_public = X25519PublicKey::from_bytes([0; 32]);
        assert_eq!(
            codec.unwrap(&wrapped, &secret).unwrap_err(),
            CryptoError::UnwrapFailure
        );
    }

    #[test]
    fn test_wraps_are_randomized() {
        let codec = KeyWrapCodec::new();
        let secret = X25519StaticSecret::generate();
        let key = codec.generate_content_key().unwrap();

        let a = codec.wrap(&key, &secret.public_key(), context(1)).unwrap();
        let b = codec.wrap(&key, &secret.public_key(), context(1)).unwrap();
        assert_ne!(a.ephemeral_public, b.ephemeral_public);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_document_wrong_key_is_tampered() {
        let codec = KeyWrapCodec::new();
        let key = codec.generate_content_key().unwrap();
        let other = codec.generate_content_key().unwrap();

        let doc = codec.encrypt_document(&key, b"lab results").unwrap();
        assert_eq!(
            codec.decrypt_document(&other, &doc).unwrap_err(),
            CryptoError::TamperedCiphertext
        );
    }

    proptest! {
        #[test]
        fn prop_document_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let codec = KeyWrapCodec::new();
            let key = codec.generate_content_key().unwrap();
            let doc = codec.encrypt_document(&key, &plaintext).unwrap();
            prop_assert_eq!(codec.decrypt_document(&key, &doc).unwrap(), plaintext);
        }

        #[test]
        fn prop_any_flipped_bit_is_detected(index in 0usize..48, bit in 0u8..8) {
            let codec = KeyWrapCodec::new();
            let secret = X25519StaticSecret::from_bytes([9; 32]);
            let key = ContentKey::from_bytes([7; 32]);

            let mut wrapped = codec.wrap(&key, &secret.public_key(), context(3)).unwrap();
            prop_assert_eq!(wrapped.ciphertext.len(), 48);
            wrapped.ciphertext[index] ^= 1 << bit;
            prop_assert_eq!(
                codec.unwrap(&wrapped, &secret).unwrap_err(),
                CryptoError::UnwrapFailure
            );
        }
    }
}
