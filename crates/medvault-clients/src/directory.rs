//! Key directory client.
//!
//! Resolves a recipient's signing identity to the X25519 public key that
//! content keys are wrapped to.

use async_trait::async_trait;

use medvault_core::RecipientId;
use medvault_crypto::X25519PublicKey;

use crate::error::Result;

/// Directory of registered wrapping keys.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// The wrapping key registered for `recipient`.
    ///
    /// Returns `KeyNotFound` if the recipient never registered one.
    async fn get_public_key(&self, recipient: &RecipientId) -> Result<X25519PublicKey>;
}

/// A simple in-memory key directory for testing.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    use crate::error::ClientError;
    use crate::faults::FaultInjector;

    #[derive(Default)]
    pub struct MemoryKeyDirectory {
        keys: RwLock<HashMap<RecipientId, X25519PublicKey>>,
        faults: FaultInjector,
    }

    impl MemoryKeyDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Injected failures for this directory.
        pub fn faults(&self) -> &FaultInjector {
            &self.faults
        }

        /// Register (or replace) a recipient's wrapping key.
        pub async fn register(&self, recipient: RecipientId, key: X25519PublicKey) {
            self.keys.write().await.insert(recipient, key);
        }

        /// Remove a recipient's wrapping key.
        pub async fn remove(&self, recipient: &RecipientId) -> Option<X25519PublicKey> {
            self.keys.write().await.remove(recipient)
        }
    }

    #[async_trait]
    impl KeyDirectory for MemoryKeyDirectory {
        async fn get_public_key(&self, recipient: &RecipientId) -> Result<X25519PublicKey> {
            if self.faults.before_call().await {
                return Err(ClientError::DirectoryUnavailable("injected fault".into()));
            }
            self.keys
                .read()
                .await
                .get(recipient)
                .copied()
                .ok_or(ClientError::KeyNotFound(*recipient))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryKeyDirectory;
    use super::*;
    use crate::error::ClientError;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let directory = MemoryKeyDirectory::new();
        let recipient = RecipientId::from_bytes([1; 32]);
        let key = X25519PublicKey::from_bytes([2; 32]);

        directory.register(recipient, key).await;
        assert_eq!(directory.get_public_key(&recipient).await.unwrap(), key);

        directory.remove(&recipient).await;
        assert_eq!(
            directory.get_public_key(&recipient).await.unwrap_err(),
            ClientError::KeyNotFound(recipient)
        );
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let directory = MemoryKeyDirectory::new();
        directory.faults().fail_next(1);
        let err = directory
            .get_public_key(&RecipientId::from_bytes([1; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::DirectoryUnavailable(_)));
    }
}
