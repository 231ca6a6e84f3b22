use crate::types::{PlanStatus, Priority};
use serde::{Deserialize, Serialize};
use taskforge_core::{AgentId, QueueId, TaskId};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// State changes published to UI consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OrchestratorEvent {
    TaskAdded {
        queue_id: QueueId,
        task_id: TaskId,
        title: String,
        priority: Priority,
    },
    TaskStarted {
        queue_id: QueueId,
        task_id: TaskId,
        agent_id: AgentId,
        attempt: u32,
    },
    TaskCompleted {
        queue_id: QueueId,
        task_id: TaskId,
        agent_id: Option<AgentId>,
        result: serde_json::Value,
        /// Minutes from enqueue to completion.
        actual_duration: Option<u64>,
    },
    /// Terminal failure, retries exhausted.
    TaskFailed {
        queue_id: QueueId,
        task_id: TaskId,
        error: String,
        retries: u32,
    },
    TaskRetrying {
        queue_id: QueueId,
        task_id: TaskId,
        error: String,
        retry_count: u32,
    },
    TaskCancelled {
        queue_id: QueueId,
        task_id: TaskId,
    },
    PlanCreated {
        plan_id: Uuid,
        title: String,
        task_count: usize,
    },
    PlanUpdated {
        plan_id: Uuid,
        status: PlanStatus,
        progress: u8,
    },
    AgentRegistered {
        agent_id: AgentId,
        role: String,
    },
    AgentUnregistered {
        agent_id: AgentId,
    },
}

/// Fan-out of [`OrchestratorEvent`]s over a broadcast channel.
///
/// Slow subscribers lag and lose the oldest events; publishing never blocks.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: OrchestratorEvent) {
        // Err only means nobody is listening
        if self.tx.send(event).is_err() {
            trace!("EventBus: no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
