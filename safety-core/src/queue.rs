//! Background escalation queue
//!
//! The chat reply path submits a [`ChatTurn`] and moves on. A single worker
//! drains the bounded channel and runs the orchestrator for each turn. The
//! submitter never waits on classification and never sees its failures.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::QueueError;
use crate::orchestrator::{ClassificationOutcome, SharedEscalationOrchestrator};
use crate::state::ChatTurn;

/// Counts of how queued turns ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub processed: usize,
    pub no_action: usize,
    pub incidents_recorded: usize,
    pub recording_failures: usize,
    pub unavailable: usize,
}

impl WorkerSummary {
    pub fn observe(&mut self, outcome: &ClassificationOutcome) {
        self.processed += 1;
        match outcome {
            ClassificationOutcome::NoAction { .. } => self.no_action += 1,
            ClassificationOutcome::IncidentRecorded { .. } => self.incidents_recorded += 1,
            ClassificationOutcome::RecordingFailed { .. } => self.recording_failures += 1,
            ClassificationOutcome::Unavailable { .. } => self.unavailable += 1,
        }
    }
}

/// Cloneable submit side of the queue.
#[derive(Clone)]
pub struct QueueHandle {
    sender: mpsc::Sender<ChatTurn>,
    capacity: usize,
}

impl QueueHandle {
    /// Enqueue a turn without waiting. Fails if the queue is full or closed.
    pub fn submit(&self, turn: ChatTurn) -> Result<(), QueueError> {
        self.sender.try_send(turn).map_err(|e| match e {
            mpsc::error::TrySendError::Full(turn) => {
                warn!(
                    conversation_id = %turn.conversation_id,
                    capacity = self.capacity,
                    "Escalation queue full; turn dropped"
                );
                QueueError::Full {
                    capacity: self.capacity,
                }
            }
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Enqueue a turn, waiting for capacity.
    pub async fn submit_wait(&self, turn: ChatTurn) -> Result<(), QueueError> {
        self.sender.send(turn).await.map_err(|_| QueueError::Closed)
    }
}

/// Bounded queue plus the worker task draining it.
pub struct EscalationQueue {
    handle: QueueHandle,
    worker: JoinHandle<WorkerSummary>,
}

impl EscalationQueue {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn start(orchestrator: SharedEscalationOrchestrator, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let worker = tokio::spawn(run_worker(orchestrator, receiver));
        info!(capacity, "Escalation queue started");
        Self {
            handle: QueueHandle { sender, capacity },
            worker,
        }
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn submit(&self, turn: ChatTurn) -> Result<(), QueueError> {
        self.handle.submit(turn)
    }

    /// Close the queue, wait for queued turns to finish, and report.
    ///
    /// Outstanding [`QueueHandle`] clones keep the channel open; drop them
    /// first or this waits for them.
    pub async fn shutdown(self) -> Result<WorkerSummary, QueueError> {
        let Self { handle, worker } = self;
        drop(handle);
        let summary = worker
            .await
            .map_err(|e| QueueError::Worker(e.to_string()))?;
        info!(
            processed = summary.processed,
            incidents = summary.incidents_recorded,
            unavailable = summary.unavailable,
            "Escalation queue drained"
        );
        Ok(summary)
    }
}

async fn run_worker(
    orchestrator: SharedEscalationOrchestrator,
    mut receiver: mpsc::Receiver<ChatTurn>,
) -> WorkerSummary {
    let mut summary = WorkerSummary::default();
    while let Some(turn) = receiver.recv().await {
        let outcome = orchestrator.run(&turn).await;
        debug!(
            conversation_id = %turn.conversation_id,
            stage = %outcome.stage(),
            "Queued turn processed"
        );
        summary.observe(&outcome);
    }
    summary
}
