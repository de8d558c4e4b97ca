//! # MedVault Crypto
//!
//! Content keys, key wrapping and document encryption.
//!
//! ## Encryption Model
//!
//! Every document uses a two-layer key model:
//!
//! 1. **Content Key**: A symmetric key (ChaCha20-Poly1305) that encrypts the document
//! 2. **Wrapped Keys**: The content key sealed to each recipient via X25519 ECDH
//!
//! Adding or removing a recipient re-wraps the content key into a new
//! [`WrappedKeySet`] at the next key version. The document ciphertext is
//! never re-encrypted.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use medvault_core::{DocumentId, KeyVersion, RecipientId};
//! use medvault_crypto::{KeyWrapCodec, WrapContext, X25519StaticSecret};
//!
//! let codec = KeyWrapCodec::new();
//! let secret = X25519StaticSecret::generate();
//! let key = codec.generate_content_key().unwrap();
//! let document = codec.encrypt_document(&key, b"discharge summary").unwrap();
//!
//! let context = WrapContext::new(
//!     DocumentId::from_bytes([0; 32]),
//!     RecipientId::from_bytes([1; 32]),
//!     KeyVersion::INITIAL,
//! );
//! let wrapped = codec.wrap(&key, &secret.public_key(), context).unwrap();
//! let opened = codec.unwrap(&wrapped, &secret).unwrap();
//! let plaintext = codec.decrypt_document(&opened, &document).unwrap();
//! ```

pub mod codec;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod wrapped;

pub use codec::KeyWrapCodec;
pub use crypto::{ContentKey, EncryptionNonce, X25519PublicKey, X25519StaticSecret};
pub use envelope::{EncryptedDocument, EncryptionFormat};
pub use error::{CryptoError, Result};
pub use wrapped::{WrapContext, WrappedKey, WrappedKeySet};
