//! Fault injection for the in-memory collaborators.
//!
//! Every memory client owns a [`FaultInjector`]. Tests arm it to fail the
//! next N calls, to add latency to every call, or (for the ledger) to apply
//! a write and then drop its acknowledgement.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Switchboard of injected failures shared by one memory client.
#[derive(Debug, Default)]
pub struct FaultInjector {
    fail_next: AtomicU32,
    drop_ack_next: AtomicU32,
    latency_ms: AtomicU64,
    calls: AtomicU64,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls before they touch any state.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Apply the next `n` writes but report them as failed.
    pub fn drop_ack_next(&self, n: u32) {
        self.drop_ack_next.store(n, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Disarm everything.
    pub fn clear(&self) {
        self.fail_next.store(0, Ordering::SeqCst);
        self.drop_ack_next.store(0, Ordering::SeqCst);
        self.latency_ms.store(0, Ordering::SeqCst);
    }

    /// Number of calls seen so far, including failed ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Run the injected latency, then report whether this call must fail.
    pub(crate) async fn before_call(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        take(&self.fail_next)
    }

    /// Whether the acknowledgement of an applied write must be dropped.
    pub(crate) fn take_dropped_ack(&self) -> bool {
        take(&self.drop_ack_next)
    }
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_next_counts_down() {
        let faults = FaultInjector::new();
        faults.fail_next(2);

        assert!(faults.before_call().await);
        assert!(faults.before_call().await);
        assert!(!faults.before_call().await);
        assert_eq!(faults.calls(), 3);
    }

    #[tokio::test]
    async fn test_clear_disarms() {
        let faults = FaultInjector::new();
        faults.fail_next(5);
        faults.drop_ack_next(1);
        faults.clear();

        assert!(!faults.before_call().await);
        assert!(!faults.take_dropped_ack());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let faults = FaultInjector::new();
        faults.set_latency(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        faults.before_call().await;
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
