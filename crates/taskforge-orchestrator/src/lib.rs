//! Multi-agent task scheduling engine.
//!
//! Turns a natural-language request into a dependency graph of tasks, queues
//! them by priority, pairs runnable tasks with idle agents and drives their
//! execution with timeouts, retries and cancellation.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Top-level engine owning the queue, the agent registry and the plans.
//! - [`TaskDecomposer`] — Rule-driven request → task graph decomposition.
//! - [`TaskQueue`] — Priority queue with dependency gating and retry bookkeeping.
//! - [`AgentRegistry`] — Agent roster, status and performance metrics.
//! - [`Effector`] — Pluggable execution of a task's content.

/// Keyed, cancellable delayed callbacks used for task timeouts.
pub mod alarm;
/// Engine and scheduler configuration.
pub mod config;
/// Request analysis and task graph construction.
pub mod decomposer;
/// Task execution backends.
pub mod effector;
/// Orchestration engine and dispatch loop.
pub mod engine;
/// Event feed for UI consumers.
pub mod events;
/// Agent-to-task suitability.
pub mod matcher;
/// Built-in agent roster.
pub mod profiles;
/// Agent registry and metrics.
pub mod registry;
/// Decomposition rule tables and keyword vocabulary.
pub mod rules;
/// Priority task queue.
pub mod task_queue;
/// Shared types (Task, Agent, TaskPlan, etc.).
pub mod types;
/// Task graph validation.
pub mod validation;

pub use config::{load_config, OrchestratorConfig, QueueConfig, SimulationConfig};
pub use decomposer::{DecompositionContext, DecompositionStats, TaskDecomposer};
pub use effector::{Effector, SimulatedEffector};
pub use engine::{Orchestrator, OrchestratorResult, SystemStatus};
pub use events::{EventBus, OrchestratorEvent};
pub use matcher::{KeywordMatcher, Matcher};
pub use profiles::default_agents;
pub use registry::{AgentRegistry, RegistrySummary};
pub use rules::{default_rules, DecompositionRule, Vocabulary};
pub use task_queue::{FailOutcome, QueueStats, TaskQueue};
pub use types::{
    Agent, AgentPerformance, AgentStatus, Complexity, PlanStatus, Priority, QueuedTask, Task,
    TaskPlan, TaskStatus,
};
pub use validation::{ValidationIssue, ValidationReport};
