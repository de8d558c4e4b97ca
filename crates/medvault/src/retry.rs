//! Timeouts and bounded retries for collaborator calls.
//!
//! Every remote call is wrapped in the configured timeout. A timeout becomes
//! the unavailability error of the collaborator that was called, so it is
//! retried like any other transient failure.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryPolicy;
use crate::error::{Result, VaultError};

/// The collaborator a call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Collaborator {
    Storage,
    Ledger,
    Directory,
}

impl Collaborator {
    fn timed_out(self, op: &str, after: Duration) -> VaultError {
        let message = format!("{} timed out after {:?}", op, after);
        match self {
            Collaborator::Storage => VaultError::StorageUnavailable(message),
            Collaborator::Ledger => VaultError::LedgerUnavailable(message),
            Collaborator::Directory => VaultError::DirectoryUnavailable(message),
        }
    }
}

/// Applies a call timeout and a retry policy.
#[derive(Debug, Clone)]
pub(crate) struct Retrier {
    policy: RetryPolicy,
    timeout: Duration,
}

impl Retrier {
    pub(crate) fn new(policy: RetryPolicy, timeout: Duration) -> Self {
        Self { policy, timeout }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.policy.attempts()
    }

    /// Run one attempt under the call timeout.
    pub(crate) async fn once<T, E, Fut>(
        &self,
        who: Collaborator,
        op: &'static str,
        call: Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<VaultError>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(who.timed_out(op, self.timeout)),
        }
    }

    /// Sleep for the backoff that follows failed attempt `attempt`.
    pub(crate) async fn backoff(&self, attempt: u32) {
        tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    pub(crate) async fn call<T, E, F, Fut>(
        &self,
        who: Collaborator,
        op: &'static str,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<VaultError>,
    {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match self.once(who, op, call()).await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(op, attempt, error = %e, "transient failure, retrying");
                    self.backoff(attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medvault_clients::ClientError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retrier(attempts: u32) -> Retrier {
        Retrier::new(
            RetryPolicy::default()
                .with_max_attempts(attempts)
                .with_initial_backoff(Duration::from_millis(1)),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retrier(3)
            .call(Collaborator::Storage, "put", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ClientError::StorageUnavailable("down".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retrier(2)
            .call(Collaborator::Ledger, "update", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ClientError::LedgerUnavailable("down".into()))
            })
            .await;

        assert!(matches!(result, Err(VaultError::LedgerUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retrier(5)
            .call(Collaborator::Directory, "lookup", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                let missing = medvault_core::RecipientId::from_bytes([1; 32]);
                Err::<(), _>(ClientError::KeyNotFound(missing))
            })
            .await;

        assert!(matches!(result, Err(VaultError::UnknownRecipient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_collaborator() {
        let result: Result<()> = retrier(1)
            .call(Collaborator::Directory, "lookup", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<(), ClientError>(())
            })
            .await;

        assert!(matches!(result, Err(VaultError::DirectoryUnavailable(_))));
    }
}
