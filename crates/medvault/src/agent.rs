//! Background agent that runs the orchestrator.
//!
//! The agent is a three-state machine:
//!
//! ```text
//!   Idle ──start()──► Running ──stop()──► Draining ──► Idle
//! ```
//!
//! Transitions are serialized by a control lock and are idempotent. While
//! running, one worker task consumes a bounded FIFO queue of events and
//! spawns each re-wrap as its own task, at most `max_in_flight` at a time.
//! Events on the same document take effect in submission order; events on
//! different documents run in parallel. Stopping rejects everything still
//! queued with [`VaultError::AgentStopped`] and waits for the re-wraps
//! already started.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use medvault_core::{AccessEvent, EventKind};

use crate::config::OrchestratorConfig;
use crate::error::{Result, VaultError};
use crate::locks::DocumentQueue;
use crate::orchestrator::{ReencryptionOrchestrator, RewrapOutcome};

/// Lifecycle state of an [`Agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AgentState {
    Idle = 0,
    Running = 1,
    Draining = 2,
}

impl AgentState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AgentState::Running,
            2 => AgentState::Draining,
            _ => AgentState::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Running => "running",
            AgentState::Draining => "draining",
        }
    }
}

struct Job {
    kind: EventKind,
    event: AccessEvent,
    reply: oneshot::Sender<Result<RewrapOutcome>>,
}

impl Job {
    fn reject(self) {
        let _ = self.reply.send(Err(VaultError::AgentStopped));
    }
}

struct Worker {
    sender: mpsc::Sender<Job>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Resolves when a submitted event has been processed or rejected.
#[must_use = "a ticket does nothing unless awaited"]
pub struct RewrapTicket {
    inner: TicketInner,
}

enum TicketInner {
    Pending(oneshot::Receiver<Result<RewrapOutcome>>),
    Rejected(Option<VaultError>),
}

impl RewrapTicket {
    fn rejected(error: VaultError) -> Self {
        Self {
            inner: TicketInner::Rejected(Some(error)),
        }
    }
}

impl Future for RewrapTicket {
    type Output = Result<RewrapOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            // A dropped reply means the worker went away without answering.
            TicketInner::Pending(reply) => Pin::new(reply)
                .poll(cx)
                .map(|received| received.unwrap_or_else(|_| Err(VaultError::AgentStopped))),
            TicketInner::Rejected(error) => {
                Poll::Ready(Err(error.take().unwrap_or(VaultError::AgentStopped)))
            }
        }
    }
}

/// Start/stop-able front of a [`ReencryptionOrchestrator`].
pub struct Agent {
    orchestrator: Arc<ReencryptionOrchestrator>,
    config: OrchestratorConfig,
    state: AtomicU8,
    control: Mutex<Option<Worker>>,
}

impl Agent {
    pub fn new(orchestrator: Arc<ReencryptionOrchestrator>, config: OrchestratorConfig) -> Self {
        Self {
            orchestrator,
            config,
            state: AtomicU8::new(AgentState::Idle as u8),
            control: Mutex::new(None),
        }
    }

    pub fn orchestrator(&self) -> &Arc<ReencryptionOrchestrator> {
        &self.orchestrator
    }

    pub fn status(&self) -> AgentState {
        AgentState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: AgentState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Idle -> Running. Does nothing if already running.
    pub async fn start(&self) {
        let mut control = self.control.lock().await;
        if control.is_some() {
            return;
        }

        let (sender, jobs) = mpsc::channel(self.config.queue_capacity.max(1));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(
            self.orchestrator.clone(),
            jobs,
            shutdown_rx,
            self.config.max_in_flight.max(1),
        ));

        *control = Some(Worker {
            sender,
            shutdown,
            handle,
        });
        self.set_state(AgentState::Running);
        info!(
            queue_capacity = self.config.queue_capacity,
            max_in_flight = self.config.max_in_flight,
            "agent running"
        );
    }

    /// Running -> Draining -> Idle. Does nothing if already idle.
    ///
    /// Returns once every started re-wrap has finished.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        let Some(worker) = control.take() else {
            return;
        };

        self.set_state(AgentState::Draining);
        info!("agent draining");

        let Worker {
            sender,
            shutdown,
            handle,
        } = worker;
        let _ = shutdown.send(());
        drop(sender);
        if let Err(e) = handle.await {
            error!(error = %e, "agent worker ended abnormally");
        }

        self.set_state(AgentState::Idle);
        info!("agent stopped");
    }

    /// Queue a grant event.
    pub async fn submit_grant(&self, event: AccessEvent) -> RewrapTicket {
        self.submit(EventKind::Grant, event).await
    }

    /// Queue a revoke event.
    pub async fn submit_revoke(&self, event: AccessEvent) -> RewrapTicket {
        self.submit(EventKind::Revoke, event).await
    }

    /// Waits for queue space when the queue is full.
    async fn submit(&self, kind: EventKind, event: AccessEvent) -> RewrapTicket {
        if self.status() != AgentState::Running {
            return RewrapTicket::rejected(VaultError::AgentStopped);
        }
        let sender = match self.control.lock().await.as_ref() {
            Some(worker) => worker.sender.clone(),
            None => return RewrapTicket::rejected(VaultError::AgentStopped),
        };

        let (reply, receiver) = oneshot::channel();
        let document = event.document_id;
        let job = Job { kind, event, reply };
        if sender.send(job).await.is_err() {
            return RewrapTicket::rejected(VaultError::AgentStopped);
        }

        debug!(document = %document, kind = kind.as_str(), "event queued");
        RewrapTicket {
            inner: TicketInner::Pending(receiver),
        }
    }
}

async fn run(
    orchestrator: Arc<ReencryptionOrchestrator>,
    mut jobs: mpsc::Receiver<Job>,
    mut shutdown: oneshot::Receiver<()>,
    max_in_flight: usize,
) {
    let permits = Arc::new(Semaphore::new(max_in_flight));
    let mut tasks = JoinSet::new();
    let mut order = DocumentQueue::new();

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "re-wrap task panicked");
                }
            }

            job = jobs.recv() => {
                let Some(job) = job else { break };

                // Hold the job until a slot frees up, unless told to stop first.
                let permit = tokio::select! {
                    biased;
                    _ = &mut shutdown => None,
                    permit = permits.clone().acquire_owned() => permit.ok(),
                };
                let Some(permit) = permit else {
                    job.reject();
                    break;
                };

                // Taken here, in dequeue order, so tasks on one document
                // cannot overtake each other once spawned.
                let mut turn = order.join(job.event.document_id);
                let orchestrator = orchestrator.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    turn.wait().await;
                    let result = match job.kind {
                        EventKind::Grant => orchestrator.handle_grant(&job.event).await,
                        EventKind::Revoke => orchestrator.handle_revoke(&job.event).await,
                    };
                    let _ = job.reply.send(result);
                    drop(turn);
                });
            }
        }
    }

    jobs.close();
    let mut rejected = 0usize;
    while let Ok(job) = jobs.try_recv() {
        job.reject();
        rejected += 1;
    }
    if rejected > 0 {
        info!(rejected, "rejected queued events on shutdown");
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "re-wrap task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let h = Harness::new().await;
        let agent = h.agent();
        assert_eq!(agent.status(), AgentState::Idle);

        agent.stop().await;
        assert_eq!(agent.status(), AgentState::Idle);

        agent.start().await;
        agent.start().await;
        assert_eq!(agent.status(), AgentState::Running);

        agent.stop().await;
        agent.stop().await;
        assert_eq!(agent.status(), AgentState::Idle);

        // A restarted agent processes events again.
        agent.start().await;
        let bob = h.party(2).await;
        let doc = h.store(b"imaging report").await;
        let outcome = agent
            .submit_grant(h.owner.grant(doc, bob.principal()))
            .await
            .await
            .unwrap();
        assert_eq!(outcome.key_version.get(), 2);
        agent.stop().await;
    }

    #[tokio::test]
    async fn test_submit_while_idle_is_rejected() {
        let h = Harness::new().await;
        let agent = h.agent();
        let bob = h.party(2).await;
        let doc = h.store(b"imaging report").await;

        let result = agent.submit_grant(h.owner.grant(doc, bob.principal())).await.await;
        assert!(matches!(result, Err(VaultError::AgentStopped)));
    }

    #[tokio::test]
    async fn test_failures_resolve_the_ticket() {
        let h = Harness::new().await;
        let agent = h.agent();
        agent.start().await;
        let doc = h.store(b"imaging report").await;

        let result = agent
            .submit_revoke(h.owner.revoke(doc, h.owner.principal()))
            .await
            .await;
        assert!(matches!(result, Err(VaultError::CannotRevokeLastRecipient(_))));
        agent.stop().await;
    }

    #[test]
    fn test_state_names() {
        for state in [AgentState::Idle, AgentState::Running, AgentState::Draining] {
            assert_eq!(AgentState::from_u8(state as u8), state);
        }
        assert_eq!(AgentState::Draining.as_str(), "draining");
    }
}
