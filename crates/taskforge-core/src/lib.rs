//! Core identifiers and error definitions for the Taskforge scheduling engine.
//!
//! This crate holds the pieces shared by the orchestrator library and the CLI:
//! the unified error enum and the lookup-key types used to reference tasks,
//! queue entries and agents without owning them.
//!
//! # Main types
//!
//! - [`TaskforgeError`] — Unified error enum for all Taskforge subsystems.
//! - [`TaskforgeResult`] — Convenience alias for `Result<T, TaskforgeError>`.
//! - [`TaskId`] — Stable identifier of a logical task.
//! - [`QueueId`] — Identifier assigned to a task each time it is enqueued.
//! - [`AgentId`] — Registry key of a worker agent.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// --- Identifiers ---

/// Stable identifier of a logical task.
pub type TaskId = Uuid;

/// Registry key of an agent. Agents are looked up by id, never owned by tasks.
pub type AgentId = String;

/// Identifier stamped on a task when it enters the queue.
///
/// Distinct from the task's own [`TaskId`] so the same logical task could be
/// queued more than once. Ids are issued from a monotonically increasing
/// counter, which also makes them a stable FIFO tiebreaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(pub u64);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task_{}", self.0)
    }
}

// --- Error types ---

/// Top-level error type for Taskforge.
///
/// Locally recoverable conditions (a retryable failure, no idle agent) never
/// surface as errors; they are absorbed by the queue.
#[derive(Debug, thiserror::Error)]
pub enum TaskforgeError {
    /// The pending set already holds the configured maximum number of tasks.
    #[error("Task queue is full (capacity {capacity})")]
    QueueFull {
        /// Configured maximum queue size.
        capacity: usize,
    },

    /// The dependency graph of a plan contains a cycle.
    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    /// A running task did not report back before its deadline.
    #[error("Task {0} execution timeout")]
    TaskTimeout(QueueId),

    /// A task failed and has no retries left.
    #[error("Task {queue_id} failed after {retries} retries: {last_error}")]
    RetryExhausted {
        /// Queue entry that failed.
        queue_id: QueueId,
        /// Number of retries that were attempted.
        retries: u32,
        /// Error reported by the final attempt.
        last_error: String,
    },

    /// A lifecycle call referenced a queue entry that is not in the expected set.
    /// This always indicates a bookkeeping bug on the caller's side.
    #[error("Invalid transition: task {queue_id} is not {expected}")]
    InvalidTransition {
        /// Queue entry the caller referenced.
        queue_id: QueueId,
        /// The set the entry was expected to be in.
        expected: &'static str,
    },

    /// No agent is registered under the given id.
    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    /// The agent is currently executing a task.
    #[error("Agent busy: {0}")]
    AgentBusy(AgentId),

    /// An error raised by the external effector while executing a task.
    #[error("Effector error: {0}")]
    Effector(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the orchestration loop itself.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`TaskforgeError`].
pub type TaskforgeResult<T> = Result<T, TaskforgeError>;

impl TaskforgeError {
    /// Whether the error is a terminal outcome that should reach a human-visible layer.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskforgeError::RetryExhausted { .. } | TaskforgeError::DependencyCycle(_)
        )
    }
}
