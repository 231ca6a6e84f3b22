use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use taskforge_core::{AgentId, QueueId, TaskId};
use uuid::Uuid;

/// Priority of a task. Variants are declared low-to-high so the derived
/// `Ord` puts `Critical` on top.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Lenient parse; unknown strings fall back to `Medium`.
    pub fn parse_level(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Priority::Low,
            "medium" => Priority::Medium,
            "high" => Priority::High,
            "critical" => Priority::Critical,
            _ => Priority::Medium,
        }
    }

    /// One level up, capped at `Critical`.
    pub fn escalate(self) -> Self {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High | Priority::Critical => Priority::Critical,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// A unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    /// Tag of the decomposition rule that produced this task, if any.
    #[serde(default)]
    pub task_type: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Estimated effort in minutes.
    #[serde(default)]
    pub estimated_duration: Option<u32>,
    /// Minutes from enqueue to completion, set when the task finishes.
    #[serde(default)]
    pub actual_duration: Option<u64>,
    /// Tasks that must be completed before this one may run.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Registry key of the agent working on (or suggested for) this task.
    #[serde(default)]
    pub assigned_agent: Option<AgentId>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            task_type: None,
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            estimated_duration: None,
            actual_duration: None,
            dependencies: Vec::new(),
            assigned_agent: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.dependencies = Vec::new();
        for dep in deps {
            self.add_dependency(dep);
        }
        self
    }

    pub fn with_estimated_duration(mut self, minutes: u32) -> Self {
        self.estimated_duration = Some(minutes);
        self
    }

    pub fn with_assigned_agent(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.assigned_agent = Some(agent_id.into());
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }

    /// Adds a dependency edge. Duplicates and self-edges are ignored.
    pub fn add_dependency(&mut self, dep: TaskId) {
        if dep != self.id && !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
    }

    pub fn is_ready(&self, completed_ids: &HashSet<TaskId>) -> bool {
        self.status == TaskStatus::Pending
            && self
                .dependencies
                .iter()
                .all(|dep| completed_ids.contains(dep))
    }

    /// Records a successful terminal result. Clears any earlier error.
    pub fn complete(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    /// Records a terminal failure. Clears any result.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.result = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}

/// A task plus the scheduler-local bookkeeping the queue keeps for it.
///
/// Only the queue mutates these; callers get clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    #[serde(flatten)]
    pub task: Task,
    pub queue_id: QueueId,
    pub queued_at: DateTime<Utc>,
    /// Caller-supplied tiebreaker, higher runs first within the same priority.
    pub queue_priority: i64,
    pub retry_count: u32,
    /// Number of times this entry has been dequeued. Timeouts carry the
    /// attempt they were armed for so a stale timer cannot fail a newer run.
    pub attempt: u32,
    /// Earliest instant a retried entry may be dequeued again.
    #[serde(skip)]
    pub not_before: Option<Instant>,
}

impl QueuedTask {
    pub fn id(&self) -> TaskId {
        self.task.id
    }

    pub fn status(&self) -> TaskStatus {
        self.task.status
    }
}

/// Worker status as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Working,
    Completed,
    Error,
}

/// Running aggregates updated after every finished attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub tasks_completed: u32,
    /// Mean duration, in minutes, of completed tasks.
    pub average_response_time: f64,
    pub success_rate: f64,
}

impl Default for AgentPerformance {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            average_response_time: 0.0,
            success_rate: 1.0,
        }
    }
}

impl AgentPerformance {
    /// `avg = (avg * (n - 1) + duration) / n` with `n` the new completion count.
    pub fn record_success(&mut self, duration: f64) {
        self.tasks_completed += 1;
        let n = f64::from(self.tasks_completed);
        self.average_response_time = (self.average_response_time * (n - 1.0) + duration) / n;
    }

    /// Counts one more attempt that failed: `rate = (rate * (n + 1) - 1) / (n + 1)`,
    /// floored at zero.
    pub fn record_failure(&mut self) {
        let attempts = f64::from(self.tasks_completed) + 1.0;
        self.success_rate = ((self.success_rate * attempts - 1.0) / attempts).max(0.0);
    }
}

/// A worker descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub current_task: Option<TaskId>,
    #[serde(default)]
    pub performance: AgentPerformance,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
            description: String::new(),
            capabilities: Vec::new(),
            status: AgentStatus::Idle,
            current_task: None,
            performance: AgentPerformance::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_idle(&self) -> bool {
        self.status == AgentStatus::Idle
    }
}

/// Estimated size of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Planning,
    Executing,
    Completed,
    Failed,
}

/// The decomposition of one user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    pub id: Uuid,
    pub original_request: String,
    pub title: String,
    pub description: String,
    pub tasks: Vec<Task>,
    pub status: PlanStatus,
    /// Percentage of completed tasks, 0 to 100.
    pub progress: u8,
    #[serde(default)]
    pub assigned_agents: Vec<AgentId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskPlan {
    pub fn new(
        original_request: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        tasks: Vec<Task>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_request: original_request.into(),
            title: title.into(),
            description: description.into(),
            tasks,
            status: PlanStatus::Planning,
            progress: 0,
            assigned_agents: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn completed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    /// Recomputes `progress` and derives the plan status from its tasks.
    pub fn update_progress(&mut self) {
        let total = self.tasks.len();
        let completed = self.completed_count();
        self.progress = if total > 0 {
            ((completed as f64 / total as f64) * 100.0).round() as u8
        } else {
            0
        };

        for task in &self.tasks {
            if let Some(agent) = &task.assigned_agent {
                if task.status != TaskStatus::Pending && !self.assigned_agents.contains(agent) {
                    self.assigned_agents.push(agent.clone());
                }
            }
        }

        if total > 0 && completed == total {
            self.status = PlanStatus::Completed;
            self.completed_at.get_or_insert_with(Utc::now);
        } else if total > 0 && self.tasks.iter().all(|t| t.status.is_terminal()) {
            self.status = PlanStatus::Failed;
            self.completed_at.get_or_insert_with(Utc::now);
        } else if self.tasks.iter().any(|t| t.status != TaskStatus::Pending) {
            self.status = PlanStatus::Executing;
            self.started_at.get_or_insert_with(Utc::now);
        }
    }
}
