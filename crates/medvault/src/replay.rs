//! Freshness and replay checks for signed access events.
//!
//! An event is accepted only while its signed timestamp is within
//! `max_event_age` of the local clock, and only once: the canonical digest of
//! every applied event is remembered until the event would be stale anyway.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use medvault_core::{now_millis, AccessEvent, Blake3Hash};

use crate::error::{Result, VaultError};

pub(crate) struct ReplayGuard {
    window_ms: i64,
    /// Applied event digest -> its signed timestamp.
    applied: Mutex<HashMap<Blake3Hash, i64>>,
}

impl ReplayGuard {
    pub(crate) fn new(max_event_age: Duration) -> Self {
        Self {
            window_ms: i64::try_from(max_event_age.as_millis()).unwrap_or(i64::MAX),
            applied: Mutex::new(HashMap::new()),
        }
    }

    /// Refuse events outside the window or already applied.
    pub(crate) async fn check(&self, event: &AccessEvent) -> Result<()> {
        let skew = now_millis().saturating_sub(event.timestamp).saturating_abs();
        if skew > self.window_ms {
            warn!(
                document = %event.document_id,
                requester = %event.requested_by,
                timestamp = event.timestamp,
                "rejected access event outside the accepted window"
            );
            return Err(VaultError::InvalidEvent(format!(
                "event timestamp {} is {} ms from local time",
                event.timestamp, skew
            )));
        }

        if self.applied.lock().await.contains_key(&digest(event)) {
            warn!(
                document = %event.document_id,
                requester = %event.requested_by,
                "rejected replayed access event"
            );
            return Err(VaultError::InvalidEvent(
                "event has already been applied".to_string(),
            ));
        }
        Ok(())
    }

    /// Remember an applied event and forget the ones that have gone stale.
    pub(crate) async fn record(&self, event: &AccessEvent) {
        let oldest = now_millis().saturating_sub(self.window_ms);
        let mut applied = self.applied.lock().await;
        applied.retain(|_, timestamp| *timestamp >= oldest);
        applied.insert(digest(event), event.timestamp);
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.applied.lock().await.len()
    }
}

fn digest(event: &AccessEvent) -> Blake3Hash {
    Blake3Hash::hash(&event.signing_bytes())
}
