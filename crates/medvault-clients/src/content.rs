//! Content-addressed storage client.
//!
//! The store keeps opaque blobs (document ciphertexts and key-set manifests)
//! and hands back the address it derived for them. Blobs are immutable.

use async_trait::async_trait;
use bytes::Bytes;

use medvault_core::ContentAddress;

use crate::error::Result;

/// Content-addressed blob storage.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a blob and return its address.
    ///
    /// Storing the same bytes twice returns the same address.
    async fn put(&self, data: Bytes) -> Result<ContentAddress>;

    /// Fetch the blob at `address`.
    ///
    /// Returns `BlobNotFound` if nothing is stored there.
    async fn get(&self, address: &ContentAddress) -> Result<Bytes>;
}

/// A simple in-memory content store for testing.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    use crate::error::ClientError;
    use crate::faults::FaultInjector;

    /// In-memory content store addressed by Blake3 hash.
    #[derive(Default)]
    pub struct MemoryContentStore {
        blobs: RwLock<HashMap<ContentAddress, Bytes>>,
        faults: FaultInjector,
    }

    impl MemoryContentStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Injected failures for this store.
        pub fn faults(&self) -> &FaultInjector {
            &self.faults
        }

        /// Number of stored blobs.
        pub async fn len(&self) -> usize {
            self.blobs.read().await.len()
        }

        pub async fn is_empty(&self) -> bool {
            self.blobs.read().await.is_empty()
        }

        /// Overwrite a stored blob in place. Simulates a corrupted gateway.
        pub async fn corrupt(&self, address: &ContentAddress, data: Bytes) {
            self.blobs.write().await.insert(*address, data);
        }
    }

    #[async_trait]
    impl ContentStore for MemoryContentStore {
        async fn put(&self, data: Bytes) -> Result<ContentAddress> {
            if self.faults.before_call().await {
                return Err(ClientError::StorageUnavailable("injected fault".into()));
            }
            let address = ContentAddress::of(&data);
            self.blobs.write().await.entry(address).or_insert(data);
            Ok(address)
        }

        async fn get(&self, address: &ContentAddress) -> Result<Bytes> {
            if self.faults.before_call().await {
                return Err(ClientError::StorageUnavailable("injected fault".into()));
            }
            self.blobs
                .read()
                .await
                .get(address)
                .cloned()
                .ok_or(ClientError::BlobNotFound(*address))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryContentStore;
    use super::*;
    use crate::error::ClientError;

    #[tokio::test]
    async fn test_put_get() {
        let store = MemoryContentStore::new();
        let address = store.put(Bytes::from_static(b"ciphertext")).await.unwrap();

        assert_eq!(address, ContentAddress::of(b"ciphertext"));
        assert_eq!(store.get(&address).await.unwrap(), Bytes::from_static(b"ciphertext"));
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = MemoryContentStore::new();
        let a = store.put(Bytes::from_static(b"same")).await.unwrap();
        let b = store.put(Bytes::from_static(b"same")).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_blob() {
        let store = MemoryContentStore::new();
        let missing = ContentAddress::of(b"nothing here");
        assert_eq!(
            store.get(&missing).await.unwrap_err(),
            ClientError::BlobNotFound(missing)
        );
    }

    #[tokio::test]
    async fn test_injected_fault_is_transient() {
        let store = MemoryContentStore::new();
        store.faults().fail_next(1);

        let err = store.put(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.is_empty().await);
        store.put(Bytes::from_static(b"x")).await.unwrap();
    }
}
