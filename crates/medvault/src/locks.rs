//! Per-document serialization.
//!
//! Re-wraps on the same document must not interleave inside this process;
//! re-wraps on different documents run in parallel. Entries are pruned when
//! no task holds or waits on them.
//!
//! [`DocumentLocks`] only excludes. [`DocumentQueue`] also fixes the order:
//! the agent worker takes a [`Turn`] for each job as it dequeues it, so jobs
//! on one document run in the order they were submitted.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::{Mutex, OwnedMutexGuard};

use medvault_core::DocumentId;

#[derive(Default)]
pub(crate) struct DocumentLocks {
    entries: Mutex<HashMap<DocumentId, Arc<Mutex<()>>>>,
}

/// Held for the duration of one document's re-wrap.
pub(crate) struct DocumentGuard {
    _guard: OwnedMutexGuard<()>,
}

impl DocumentLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `document_id`.
    pub(crate) async fn acquire(&self, document_id: DocumentId) -> DocumentGuard {
        let lock = {
            let mut entries = self.entries.lock().await;
            entries.retain(|_, lock| Arc::strong_count(lock) > 1);
            entries.entry(document_id).or_default().clone()
        };
        DocumentGuard {
            _guard: lock.lock_owned().await,
        }
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Arrival order of jobs per document.
///
/// Owned by a single worker, so it needs no lock of its own.
#[derive(Default)]
pub(crate) struct DocumentQueue {
    tails: HashMap<DocumentId, oneshot::Receiver<()>>,
}

/// One job's place in its document's line.
///
/// Dropping the turn lets the next job on the same document proceed.
pub(crate) struct Turn {
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl DocumentQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Take the next place in line for `document_id`.
    pub(crate) fn join(&mut self, document_id: DocumentId) -> Turn {
        // A closed tail means its job finished; nothing waits behind it.
        self.tails
            .retain(|_, tail| matches!(tail.try_recv(), Err(TryRecvError::Empty)));
        let (done, tail) = oneshot::channel();
        Turn {
            previous: self.tails.insert(document_id, tail),
            _done: done,
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.tails.len()
    }
}

impl Turn {
    /// Wait until the job ahead on the same document has finished.
    pub(crate) async fn wait(&mut self) {
        if let Some(previous) = self.previous.take() {
            // Sender dropped, whether the job finished or panicked.
            let _ = previous.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_document_is_serialized() {
        let locks = Arc::new(DocumentLocks::new());
        let id = DocumentId::from_bytes([1; 32]);

        let first = locks.acquire(id).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_documents_do_not_block() {
        let locks = DocumentLocks::new();
        let _a = locks.acquire(DocumentId::from_bytes([1; 32])).await;
        let _b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(DocumentId::from_bytes([2; 32])),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = DocumentLocks::new();
        for seed in 0..8u8 {
            let _guard = locks.acquire(DocumentId::from_bytes([seed; 32])).await;
        }
        // The last acquire pruned everything released before it.
        assert_eq!(locks.tracked().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_turns_run_in_join_order() {
        let mut queue = DocumentQueue::new();
        let id = DocumentId::from_bytes([1; 32]);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for n in 0..16u32 {
            let mut turn = queue.join(id);
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                turn.wait().await;
                // Later jobs must not overtake even when earlier ones yield.
                tokio::time::sleep(Duration::from_millis(u64::from(16 - n))).await;
                order.lock().unwrap().push(n);
                drop(turn);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), (0..16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_turns_on_other_documents_do_not_wait() {
        let mut queue = DocumentQueue::new();
        let _held = queue.join(DocumentId::from_bytes([1; 32]));
        let mut other = queue.join(DocumentId::from_bytes([2; 32]));
        tokio::time::timeout(Duration::from_millis(100), other.wait())
            .await
            .unwrap();

        let mut behind = queue.join(DocumentId::from_bytes([1; 32]));
        assert!(
            tokio::time::timeout(Duration::from_millis(20), behind.wait())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_finished_turns_are_pruned() {
        let mut queue = DocumentQueue::new();
        for seed in 0..8u8 {
            drop(queue.join(DocumentId::from_bytes([seed; 32])));
        }
        assert_eq!(queue.tracked(), 1);
    }
}
