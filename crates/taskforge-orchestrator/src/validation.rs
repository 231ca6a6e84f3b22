//! Dependency graph validation for a task set.
//!
//! Everything here is advisory: problems are reported, never fixed.

use crate::types::Task;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use taskforge_core::TaskId;

/// Above this many tasks a decomposition is flagged as likely over-decomposed.
pub const MAX_TASKS: usize = 20;

/// Estimated durations above this many minutes are flagged as oversized.
pub const MAX_TASK_MINUTES: u32 = 240;

/// A single problem found in a task set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    Empty,
    OverDecomposed { count: usize },
    DependencyCycle { path: Vec<TaskId> },
    UnknownDependency { task: TaskId, dependency: TaskId },
    Unassigned { count: usize },
    Oversized { count: usize },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::Empty => write!(f, "no tasks were generated"),
            ValidationIssue::OverDecomposed { count } => write!(
                f,
                "{count} tasks generated (more than {MAX_TASKS}), likely over-decomposed"
            ),
            ValidationIssue::DependencyCycle { path } => {
                let joined: Vec<String> = path.iter().map(ToString::to_string).collect();
                write!(f, "dependency cycle detected: {}", joined.join(" -> "))
            }
            ValidationIssue::UnknownDependency { task, dependency } => {
                write!(f, "task {task} depends on unknown task {dependency}")
            }
            ValidationIssue::Unassigned { count } => {
                write!(f, "{count} tasks have no assigned agent")
            }
            ValidationIssue::Oversized { count } => write!(
                f,
                "{count} tasks are estimated above {MAX_TASK_MINUTES} minutes"
            ),
        }
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    /// The cycle path, if one was reported.
    pub fn cycle(&self) -> Option<&[TaskId]> {
        self.issues.iter().find_map(|issue| match issue {
            ValidationIssue::DependencyCycle { path } => Some(path.as_slice()),
            _ => None,
        })
    }
}

/// Checks a task set for emptiness, size, missing agents, oversized tasks,
/// dangling dependency ids and dependency cycles.
pub fn validate(tasks: &[Task]) -> ValidationReport {
    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    if tasks.is_empty() {
        issues.push(ValidationIssue::Empty);
    } else if tasks.len() > MAX_TASKS {
        issues.push(ValidationIssue::OverDecomposed { count: tasks.len() });
        suggestions.push("merge related tasks into larger units".to_string());
    }

    if let Some(path) = find_cycle(tasks) {
        issues.push(ValidationIssue::DependencyCycle { path });
        suggestions.push("re-check task dependencies so that none is circular".to_string());
    }

    let known: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();
    let mut dangling = false;
    for task in tasks {
        for dep in &task.dependencies {
            if !known.contains(dep) {
                dangling = true;
                issues.push(ValidationIssue::UnknownDependency {
                    task: task.id,
                    dependency: *dep,
                });
            }
        }
    }
    if dangling {
        suggestions.push("remove dependencies on tasks outside the plan".to_string());
    }

    let unassigned = tasks.iter().filter(|t| t.assigned_agent.is_none()).count();
    if unassigned > 0 {
        issues.push(ValidationIssue::Unassigned { count: unassigned });
        suggestions.push("assign a suitable agent to every task".to_string());
    }

    let oversized = tasks
        .iter()
        .filter(|t| t.estimated_duration.unwrap_or(0) > MAX_TASK_MINUTES)
        .count();
    if oversized > 0 {
        issues.push(ValidationIssue::Oversized { count: oversized });
        suggestions.push("split long-running tasks into smaller sub-tasks".to_string());
    }

    ValidationReport {
        is_valid: issues.is_empty(),
        issues,
        suggestions,
    }
}

pub fn has_cycle(tasks: &[Task]) -> bool {
    find_cycle(tasks).is_some()
}

/// Depth-first search with a recursion stack. Returns the first cycle found,
/// as a path that starts and ends on the same task id.
///
/// Dependencies on ids outside the set are treated as leaves.
pub fn find_cycle(tasks: &[Task]) -> Option<Vec<TaskId>> {
    let graph: HashMap<TaskId, &[TaskId]> = tasks
        .iter()
        .map(|t| (t.id, t.dependencies.as_slice()))
        .collect();
    // 1 = on the recursion stack, 2 = fully explored
    let mut marks: HashMap<TaskId, u8> = HashMap::new();
    let mut stack: Vec<TaskId> = Vec::new();

    for task in tasks {
        if let Some(path) = dfs_cycle(task.id, &graph, &mut marks, &mut stack) {
            return Some(path);
        }
    }
    None
}

fn dfs_cycle(
    id: TaskId,
    graph: &HashMap<TaskId, &[TaskId]>,
    marks: &mut HashMap<TaskId, u8>,
    stack: &mut Vec<TaskId>,
) -> Option<Vec<TaskId>> {
    match marks.get(&id) {
        Some(1) => {
            // back edge: the cycle is the stack suffix starting at `id`
            let start = stack.iter().position(|n| *n == id).unwrap_or(0);
            let mut path = stack[start..].to_vec();
            path.push(id);
            return Some(path);
        }
        Some(_) => return None,
        None => {}
    }

    marks.insert(id, 1);
    stack.push(id);
    if let Some(deps) = graph.get(&id) {
        for &dep in *deps {
            if let Some(path) = dfs_cycle(dep, graph, marks, stack) {
                return Some(path);
            }
        }
    }
    stack.pop();
    marks.insert(id, 2);
    None
}
