//! The orchestrator's own wrapping identity.
//!
//! Recipients' secrets never reach the vault, so every key set also carries
//! one copy of the content key wrapped to the custodian. A re-wrap opens that
//! copy, seals the unchanged key to the new recipient set, and drops it.

use medvault_core::{Blake3Hash, DocumentId, KeyVersion, RecipientId};
use medvault_crypto::{
    ContentKey, KeyWrapCodec, WrapContext, WrappedKey, WrappedKeySet, X25519PublicKey,
    X25519StaticSecret,
};

use crate::error::{Result, VaultError};

const CUSTODIAN_ID_CONTEXT: &str = "medvault-custodian-id-v1";

/// X25519 identity that holds a wrapped key for every version.
pub struct Custodian {
    id: RecipientId,
    secret: X25519StaticSecret,
}

impl Custodian {
    /// Generate a fresh custodian identity.
    pub fn generate() -> Self {
        Self::from_secret(X25519StaticSecret::generate())
    }

    /// Restore a custodian from its secret.
    ///
    /// The id is derived from the public key, so the same secret always
    /// yields the same custodian.
    pub fn from_secret(secret: X25519StaticSecret) -> Self {
        let public = secret.public_key();
        let derived = Blake3Hash::derive(CUSTODIAN_ID_CONTEXT, public.as_bytes());
        let id = RecipientId::from_bytes(derived.0);
        Self { id, secret }
    }

    pub fn id(&self) -> RecipientId {
        self.id
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    /// Wrap `key` for every recipient and for the custodian at `version`.
    pub(crate) fn seal(
        &self,
        codec: &KeyWrapCodec,
        key: &ContentKey,
        document_id: DocumentId,
        version: KeyVersion,
        recipients: &[(RecipientId, X25519PublicKey)],
    ) -> Result<WrappedKeySet> {
        let wrapped = recipients
            .iter()
            .map(|(recipient, public)| {
                codec.wrap(key, public, WrapContext::new(document_id, *recipient, version))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let custodian = codec.wrap(
            key,
            &self.public_key(),
            WrapContext::new(document_id, self.id, version),
        )?;

        let keys = WrappedKeySet::new(version, wrapped, custodian);
        keys.check()?;
        Ok(keys)
    }

    /// Recover the content key from the custodian copy.
    pub(crate) fn open(&self, codec: &KeyWrapCodec, wrapped: &WrappedKey) -> Result<ContentKey> {
        if wrapped.recipient != self.id {
            return Err(VaultError::UnwrapFailure);
        }
        Ok(codec.unwrap(wrapped, &self.secret)?)
    }
}

impl std::fmt::Debug for Custodian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Custodian").field("id", &self.id).finish_non_exhaustive()
    }
}
