//! Vault configuration.

use std::time::Duration;

/// Configuration for the Vault.
#[derive(Debug, Clone, Default)]
pub struct VaultConfig {
    /// Re-wrap orchestration settings.
    pub orchestrator: OrchestratorConfig,
}

impl VaultConfig {
    pub fn with_orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.orchestrator = orchestrator;
        self
    }
}

/// Configuration for the re-encryption orchestrator and its agent.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Events that may wait in the agent queue before `submit` blocks.
    pub queue_capacity: usize,
    /// Re-wraps allowed to run at once across all documents.
    pub max_in_flight: usize,
    /// Timeout applied to every collaborator call.
    pub call_timeout: Duration,
    /// Retry policy for transient collaborator failures.
    pub retry: RetryPolicy,
    /// How far an event's signed timestamp may be from the local clock, in
    /// either direction. Older events are refused as stale; within the
    /// window an event is applied at most once.
    pub max_event_age: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_in_flight: 16,
            call_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            max_event_age: Duration::from_secs(300),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_event_age(mut self, max_event_age: Duration) -> Self {
        self.max_event_age = max_event_age;
        self
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Total attempts, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let growth = self.multiplier.max(1.0).powi(exponent);
        let delay = self.initial_backoff.as_nanos() as f64 * growth;
        let delay = delay.min(self.max_backoff.as_nanos() as f64);
        Duration::from_nanos(delay.round() as u64)
    }
}
