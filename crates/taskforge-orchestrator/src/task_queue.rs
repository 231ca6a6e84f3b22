use crate::config::QueueConfig;
use crate::types::{Agent, QueuedTask, Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;
use taskforge_core::{AgentId, QueueId, TaskId, TaskforgeError, TaskforgeResult};
use tracing::{error, info, warn};

/// What happened to a failed attempt.
#[derive(Debug, Clone)]
pub enum FailOutcome {
    /// Back in the pending set with `retry_count` bumped.
    Retrying(QueuedTask),
    /// Retries exhausted; the task is terminally failed.
    Exhausted(QueuedTask),
}

impl FailOutcome {
    pub fn task(&self) -> &QueuedTask {
        match self {
            FailOutcome::Retrying(t) | FailOutcome::Exhausted(t) => t,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, FailOutcome::Exhausted(_))
    }

    /// The terminal error to surface to callers, if retries ran out.
    pub fn exhausted_error(&self) -> Option<TaskforgeError> {
        match self {
            FailOutcome::Exhausted(t) => Some(TaskforgeError::RetryExhausted {
                queue_id: t.queue_id,
                retries: t.retry_count,
                last_error: t.task.error.clone().unwrap_or_default(),
            }),
            FailOutcome::Retrying(_) => None,
        }
    }
}

/// Queue counters and timing aggregates. Times are in minutes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub total_queued: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Mean time pending entries have been waiting so far.
    pub average_wait_time: f64,
    /// Mean `actual_duration` of completed entries.
    pub average_execution_time: f64,
    /// Entries completed within the last hour.
    pub throughput_last_hour: usize,
}

/// Priority task queue with dependency gating, retries and cancellation.
///
/// Entries live in exactly one of the pending, running, completed, failed
/// or cancelled sets. Dependencies reference task ids and are satisfied only
/// by entries in the completed set.
pub struct TaskQueue {
    config: QueueConfig,
    pending: HashMap<QueueId, QueuedTask>,
    running: HashMap<QueueId, QueuedTask>,
    completed: HashMap<QueueId, QueuedTask>,
    failed: HashMap<QueueId, QueuedTask>,
    cancelled: HashMap<QueueId, QueuedTask>,
    next_id: u64,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            running: HashMap::new(),
            completed: HashMap::new(),
            failed: HashMap::new(),
            cancelled: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Add a task to the pending set.
    ///
    /// `priority` is a numeric tiebreaker applied within the same task priority.
    pub fn enqueue(&mut self, mut task: Task, priority: i64) -> TaskforgeResult<QueueId> {
        if self.pending.len() >= self.config.max_queue_size {
            warn!(
                capacity = self.config.max_queue_size,
                task_id = %task.id,
                "TaskQueue: rejected, queue full"
            );
            return Err(TaskforgeError::QueueFull {
                capacity: self.config.max_queue_size,
            });
        }

        let queue_id = QueueId(self.next_id);
        self.next_id += 1;

        task.status = TaskStatus::Pending;
        let entry = QueuedTask {
            task,
            queue_id,
            queued_at: Utc::now(),
            queue_priority: priority,
            retry_count: 0,
            attempt: 0,
            not_before: None,
        };
        log_event(&entry, "queued");
        self.pending.insert(queue_id, entry);
        Ok(queue_id)
    }

    /// Move the best runnable entry to running.
    pub fn dequeue(&mut self) -> Option<QueuedTask> {
        self.dequeue_where(|_| true)
    }

    /// Like [`TaskQueue::dequeue`], but takes the first candidate in
    /// scheduling order that satisfies `accept`.
    pub fn dequeue_where<F>(&mut self, mut accept: F) -> Option<QueuedTask>
    where
        F: FnMut(&QueuedTask) -> bool,
    {
        let queue_id = self
            .runnable(Instant::now())
            .into_iter()
            .find(|&t| accept(t))
            .map(|t| t.queue_id)?;

        let mut entry = self.pending.remove(&queue_id)?;
        entry.task.status = TaskStatus::Running;
        entry.task.started_at = Some(Utc::now());
        entry.attempt += 1;
        entry.not_before = None;
        log_event(&entry, "dequeued");

        let snapshot = entry.clone();
        self.running.insert(queue_id, entry);
        Some(snapshot)
    }

    /// Mark a running entry completed and record its duration.
    pub fn complete_task(
        &mut self,
        queue_id: QueueId,
        result: serde_json::Value,
    ) -> TaskforgeResult<QueuedTask> {
        let mut entry = self.take_running(queue_id)?;
        entry.task.complete(result);
        entry.task.actual_duration = Some(minutes_since(entry.queued_at, Utc::now()).round() as u64);
        log_event(&entry, "completed");

        let snapshot = entry.clone();
        self.completed.insert(queue_id, entry);
        Ok(snapshot)
    }

    /// Report a failed attempt. The entry is re-queued behind the retry delay
    /// while retries remain, otherwise it becomes terminally failed.
    pub fn fail_task(
        &mut self,
        queue_id: QueueId,
        error: impl Into<String>,
    ) -> TaskforgeResult<FailOutcome> {
        let mut entry = self.take_running(queue_id)?;
        let error = error.into();

        if entry.retry_count < self.config.max_retries {
            entry.retry_count += 1;
            entry.task.status = TaskStatus::Pending;
            entry.task.error = Some(error);
            entry.task.result = None;
            entry.task.started_at = None;
            entry.not_before = Some(Instant::now() + self.config.retry_delay());
            log_event(&entry, "failed_retry");

            let snapshot = entry.clone();
            self.pending.insert(queue_id, entry);
            Ok(FailOutcome::Retrying(snapshot))
        } else {
            entry.task.fail(error);
            entry.task.actual_duration =
                Some(minutes_since(entry.queued_at, Utc::now()).round() as u64);
            log_event(&entry, "failed_final");

            let snapshot = entry.clone();
            self.failed.insert(queue_id, entry);
            Ok(FailOutcome::Exhausted(snapshot))
        }
    }

    /// Cancel a pending or running entry. Returns false if it is in neither set.
    pub fn cancel_task(&mut self, queue_id: QueueId) -> bool {
        let entry = self
            .pending
            .remove(&queue_id)
            .or_else(|| self.running.remove(&queue_id));
        let Some(mut entry) = entry else {
            return false;
        };

        entry.task.cancel();
        entry.not_before = None;
        log_event(&entry, "cancelled");
        self.cancelled.insert(queue_id, entry);
        true
    }

    /// Timeout path. Fails the entry only if `attempt` is still the one running.
    pub fn expire(
        &mut self,
        queue_id: QueueId,
        attempt: u32,
    ) -> TaskforgeResult<Option<FailOutcome>> {
        match self.running.get(&queue_id) {
            Some(entry) if entry.attempt == attempt => {
                warn!(
                    queue_id = %queue_id,
                    task_id = %entry.id(),
                    attempt,
                    "TaskQueue: timeout"
                );
                let error = TaskforgeError::TaskTimeout(queue_id).to_string();
                self.fail_task(queue_id, error).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn stats(&self) -> QueueStats {
        let now = Utc::now();

        let average_wait_time = mean(
            self.pending
                .values()
                .map(|t| minutes_since(t.queued_at, now)),
        );
        let average_execution_time = mean(
            self.completed
                .values()
                .map(|t| t.task.actual_duration.unwrap_or(0) as f64),
        );
        let hour_ago = now - chrono::Duration::hours(1);
        let throughput_last_hour = self
            .completed
            .values()
            .filter(|t| t.task.completed_at.is_some_and(|at| at > hour_ago))
            .count();

        QueueStats {
            total_queued: self.total_count(),
            pending: self.pending.len(),
            running: self.running.len(),
            completed: self.completed.len(),
            failed: self.failed.len(),
            cancelled: self.cancelled.len(),
            average_wait_time,
            average_execution_time,
            throughput_last_hour,
        }
    }

    /// Drop terminal entries finished longer than `max_age` ago.
    ///
    /// Completed entries still referenced by a pending or running dependent
    /// are kept, otherwise that dependent could never run.
    pub fn cleanup(&mut self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let referenced: HashSet<TaskId> = self
            .pending
            .values()
            .chain(self.running.values())
            .flat_map(|t| t.task.dependencies.iter().copied())
            .collect();

        let before = self.completed.len() + self.failed.len() + self.cancelled.len();
        self.completed
            .retain(|_, t| !finished_before(t, cutoff) || referenced.contains(&t.id()));
        self.failed.retain(|_, t| !finished_before(t, cutoff));
        self.cancelled.retain(|_, t| !finished_before(t, cutoff));
        let removed = before - (self.completed.len() + self.failed.len() + self.cancelled.len());

        if removed > 0 {
            info!(removed, "TaskQueue: cleanup");
        }
        removed
    }

    /// Drop every entry and restart queue ids at 1.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.running.clear();
        self.completed.clear();
        self.failed.clear();
        self.cancelled.clear();
        self.next_id = 1;
    }

    /// Mutable access to a running entry, for binding it to an agent.
    pub fn running_mut(&mut self, queue_id: QueueId) -> Option<&mut QueuedTask> {
        self.running.get_mut(&queue_id)
    }

    /// Take an entry out of the pending set without a state transition.
    pub fn remove_pending(&mut self, queue_id: QueueId) -> Option<QueuedTask> {
        self.pending.remove(&queue_id)
    }

    pub fn get(&self, queue_id: QueueId) -> Option<&QueuedTask> {
        self.pending
            .get(&queue_id)
            .or_else(|| self.running.get(&queue_id))
            .or_else(|| self.completed.get(&queue_id))
            .or_else(|| self.failed.get(&queue_id))
            .or_else(|| self.cancelled.get(&queue_id))
    }

    /// Most recent entry for a task id.
    pub fn find_by_task(&self, task_id: TaskId) -> Option<&QueuedTask> {
        self.all_tasks()
            .into_iter()
            .rev()
            .find(|t| t.id() == task_id)
    }

    /// Every entry, ordered by queue id.
    pub fn all_tasks(&self) -> Vec<&QueuedTask> {
        let mut all: Vec<&QueuedTask> = self
            .pending
            .values()
            .chain(self.running.values())
            .chain(self.completed.values())
            .chain(self.failed.values())
            .chain(self.cancelled.values())
            .collect();
        all.sort_by_key(|t| t.queue_id);
        all
    }

    /// For each idle agent, the runnable entries it could take, in scheduling
    /// order. Entries hinted to a different agent are skipped.
    pub fn recommended_assignment(&self, agents: &[Agent]) -> BTreeMap<AgentId, Vec<QueueId>> {
        let runnable = self.runnable(Instant::now());
        let mut assignment = BTreeMap::new();

        for agent in agents.iter().filter(|a| a.is_idle()) {
            let suitable: Vec<QueueId> = runnable
                .iter()
                .filter(|t| {
                    t.task
                        .assigned_agent
                        .as_ref()
                        .map_or(true, |hint| hint == &agent.id)
                })
                .map(|t| t.queue_id)
                .collect();
            if !suitable.is_empty() {
                assignment.insert(agent.id.clone(), suitable);
            }
        }
        assignment
    }

    /// Earliest future instant at which a retry-delayed entry becomes runnable.
    pub fn next_retry_at(&self) -> Option<Instant> {
        let now = Instant::now();
        self.pending
            .values()
            .filter_map(|t| t.not_before)
            .filter(|at| *at > now)
            .min()
    }

    /// Nothing pending and nothing running.
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn total_count(&self) -> usize {
        self.pending.len()
            + self.running.len()
            + self.completed.len()
            + self.failed.len()
            + self.cancelled.len()
    }

    fn take_running(&mut self, queue_id: QueueId) -> TaskforgeResult<QueuedTask> {
        self.running.remove(&queue_id).ok_or_else(|| {
            error!(queue_id = %queue_id, "TaskQueue: task is not running");
            TaskforgeError::InvalidTransition {
                queue_id,
                expected: "running",
            }
        })
    }

    /// Pending entries whose retry gate has passed and whose dependencies
    /// are all completed, in scheduling order.
    fn runnable(&self, now: Instant) -> Vec<&QueuedTask> {
        let completed_ids: HashSet<TaskId> = self.completed.values().map(QueuedTask::id).collect();

        let mut ready: Vec<&QueuedTask> = self
            .pending
            .values()
            .filter(|t| t.not_before.map_or(true, |at| at <= now))
            .filter(|t| t.task.is_ready(&completed_ids))
            .collect();

        if self.config.priority_mode {
            ready.sort_by(|a, b| priority_order(a, b));
        } else {
            ready.sort_by(|a, b| fifo_order(a, b));
        }
        ready
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

/// Task priority first, then numeric queue priority (higher first), then oldest.
fn priority_order(a: &QueuedTask, b: &QueuedTask) -> Ordering {
    b.task
        .priority
        .cmp(&a.task.priority)
        .then_with(|| b.queue_priority.cmp(&a.queue_priority))
        .then_with(|| fifo_order(a, b))
}

fn fifo_order(a: &QueuedTask, b: &QueuedTask) -> Ordering {
    a.queued_at
        .cmp(&b.queued_at)
        .then_with(|| a.queue_id.cmp(&b.queue_id))
}

fn finished_before(entry: &QueuedTask, cutoff: DateTime<Utc>) -> bool {
    entry.task.completed_at.is_some_and(|at| at <= cutoff)
}

fn minutes_since(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 60_000.0
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn log_event(entry: &QueuedTask, event: &str) {
    info!(
        queue_id = %entry.queue_id,
        task_id = %entry.id(),
        title = %entry.task.title,
        status = ?entry.task.status,
        priority = %entry.task.priority,
        retry_count = entry.retry_count,
        event,
        "TaskQueue: {event}"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use serde_json::json;

    fn queue_with(max_retries: u32, priority_mode: bool) -> TaskQueue {
        TaskQueue::new(QueueConfig {
            max_retries,
            retry_delay_ms: 0,
            priority_mode,
            ..QueueConfig::default()
        })
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = TaskQueue::default();
        assert_eq!(queue.total_count(), 0);
        assert!(queue.is_drained());
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_queue_ids_are_sequential() {
        let mut queue = TaskQueue::default();
        let a = queue.enqueue(Task::new("A", ""), 0).unwrap();
        let b = queue.enqueue(Task::new("B", ""), 0).unwrap();
        assert_eq!(a, QueueId(1));
        assert_eq!(b, QueueId(2));
        assert_eq!(a.to_string(), "task_1");
    }

    #[test]
    fn test_queue_full() {
        let mut queue = TaskQueue::new(QueueConfig {
            max_queue_size: 2,
            ..QueueConfig::default()
        });
        queue.enqueue(Task::new("A", ""), 0).unwrap();
        queue.enqueue(Task::new("B", ""), 0).unwrap();
        let err = queue.enqueue(Task::new("C", ""), 0).unwrap_err();
        assert!(matches!(err, TaskforgeError::QueueFull { capacity: 2 }));

        // Running entries do not count against the pending capacity
        queue.dequeue().unwrap();
        assert!(queue.enqueue(Task::new("C", ""), 0).is_ok());
    }

    #[test]
    fn test_dependency_gating() {
        let mut queue = TaskQueue::default();
        let first = Task::new("First", "");
        let second = Task::new("Second", "")
            .with_priority(Priority::Critical)
            .with_dependencies(vec![first.id]);
        queue.enqueue(second, 0).unwrap();
        let first_qid = queue.enqueue(first, 0).unwrap();

        // Second outranks First but is blocked
        let got = queue.dequeue().unwrap();
        assert_eq!(got.task.title, "First");
        assert_eq!(got.status(), TaskStatus::Running);
        assert_eq!(got.attempt, 1);
        assert!(got.task.started_at.is_some());
        assert!(queue.dequeue().is_none());

        queue.complete_task(first_qid, json!("done")).unwrap();
        assert_eq!(queue.dequeue().unwrap().task.title, "Second");
    }

    #[test]
    fn test_priority_mode_ordering() {
        let mut queue = queue_with(3, true);
        queue.enqueue(Task::new("low", "").with_priority(Priority::Low), 100).unwrap();
        queue.enqueue(Task::new("high-a", "").with_priority(Priority::High), 1).unwrap();
        queue.enqueue(Task::new("high-b", "").with_priority(Priority::High), 5).unwrap();
        queue.enqueue(Task::new("critical", "").with_priority(Priority::Critical), 0).unwrap();
        queue.enqueue(Task::new("high-c", "").with_priority(Priority::High), 5).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue())
            .map(|t| t.task.title)
            .collect();
        assert_eq!(order, vec!["critical", "high-b", "high-c", "high-a", "low"]);
    }

    #[test]
    fn test_fifo_mode_ordering() {
        let mut queue = queue_with(3, false);
        queue.enqueue(Task::new("first", "").with_priority(Priority::Low), 0).unwrap();
        queue.enqueue(Task::new("second", "").with_priority(Priority::Critical), 9).unwrap();
        queue.enqueue(Task::new("third", "").with_priority(Priority::High), 0).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue())
            .map(|t| t.task.title)
            .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_dequeue_where_skips_rejected() {
        let mut queue = TaskQueue::default();
        queue.enqueue(Task::new("A", "").with_priority(Priority::High), 0).unwrap();
        queue.enqueue(Task::new("B", ""), 0).unwrap();

        let got = queue.dequeue_where(|t| t.task.title == "B").unwrap();
        assert_eq!(got.task.title, "B");
        assert!(queue.dequeue_where(|_| false).is_none());
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn test_retry_until_exhausted() {
        let mut queue = queue_with(2, true);
        let qid = queue.enqueue(Task::new("flaky", ""), 0).unwrap();

        queue.dequeue().unwrap();
        let outcome = queue.fail_task(qid, "e1").unwrap();
        assert!(!outcome.is_exhausted());
        assert_eq!(outcome.task().retry_count, 1);
        assert_eq!(outcome.task().status(), TaskStatus::Pending);
        assert_eq!(outcome.task().task.error.as_deref(), Some("e1"));

        assert_eq!(queue.dequeue().unwrap().attempt, 2);
        let outcome = queue.fail_task(qid, "e2").unwrap();
        assert_eq!(outcome.task().retry_count, 2);

        queue.dequeue().unwrap();
        let outcome = queue.fail_task(qid, "e3").unwrap();
        assert!(outcome.is_exhausted());
        let task = outcome.task();
        assert_eq!(task.retry_count, 2);
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.task.error.as_deref(), Some("e3"));
        assert!(task.task.completed_at.is_some());

        let err = outcome.exhausted_error().unwrap();
        assert!(err.is_terminal());
        assert_eq!(err.to_string(), "Task task_1 failed after 2 retries: e3");

        // Never re-enqueued
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.stats().failed, 1);
    }

    #[test]
    fn test_retry_delay_gates_dequeue() {
        let mut queue = TaskQueue::new(QueueConfig {
            retry_delay_ms: 60_000,
            ..QueueConfig::default()
        });
        let qid = queue.enqueue(Task::new("A", ""), 0).unwrap();
        queue.dequeue().unwrap();
        queue.fail_task(qid, "boom").unwrap();

        assert!(queue.dequeue().is_none());
        assert!(queue.next_retry_at().is_some());
        assert!(!queue.is_drained());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut queue = TaskQueue::default();
        let qid = queue.enqueue(Task::new("A", ""), 0).unwrap();

        let err = queue.complete_task(qid, json!(null)).unwrap_err();
        assert!(matches!(
            err,
            TaskforgeError::InvalidTransition { expected: "running", .. }
        ));
        assert!(queue.fail_task(QueueId(99), "x").is_err());
        // The pending entry was not disturbed
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn test_cancel_pending_and_running() {
        let mut queue = TaskQueue::default();
        let a = queue.enqueue(Task::new("A", ""), 0).unwrap();
        let b = queue.enqueue(Task::new("B", ""), 0).unwrap();
        queue.dequeue().unwrap();

        assert!(queue.cancel_task(a));
        assert!(queue.cancel_task(b));
        assert!(!queue.cancel_task(a));
        assert_eq!(queue.get(a).unwrap().status(), TaskStatus::Cancelled);
        assert!(queue.complete_task(a, json!(1)).is_err());
        assert_eq!(queue.stats().cancelled, 2);
        assert!(queue.is_drained());
    }

    #[test]
    fn test_expire_checks_attempt() {
        let mut queue = queue_with(1, true);
        let qid = queue.enqueue(Task::new("slow", ""), 0).unwrap();
        let first = queue.dequeue().unwrap();

        let outcome = queue.expire(qid, first.attempt).unwrap().unwrap();
        assert!(!outcome.is_exhausted());
        assert_eq!(
            outcome.task().task.error.as_deref(),
            Some("Task task_1 execution timeout")
        );

        let second = queue.dequeue().unwrap();
        // A stale timer from the first attempt is ignored
        assert!(queue.expire(qid, first.attempt).unwrap().is_none());
        assert_eq!(queue.running_count(), 1);

        let outcome = queue.expire(qid, second.attempt).unwrap().unwrap();
        assert!(outcome.is_exhausted());
    }

    #[test]
    fn test_complete_records_duration() {
        let mut queue = TaskQueue::default();
        let qid = queue.enqueue(Task::new("A", ""), 0).unwrap();
        queue.dequeue().unwrap();
        let done = queue.complete_task(qid, json!({"ok": true})).unwrap();
        assert_eq!(done.status(), TaskStatus::Completed);
        assert_eq!(done.task.actual_duration, Some(0));
        assert_eq!(done.task.result, Some(json!({"ok": true})));

        let stats = queue.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.total_queued, 1);
        assert_eq!(stats.throughput_last_hour, 1);
    }

    #[test]
    fn test_cleanup_keeps_referenced_dependencies() {
        let mut queue = TaskQueue::default();
        let base = Task::new("base", "");
        let lone = Task::new("lone", "");
        let dependent = Task::new("dependent", "").with_dependencies(vec![base.id]);

        let base_qid = queue.enqueue(base, 0).unwrap();
        let lone_qid = queue.enqueue(lone, 0).unwrap();
        for qid in [base_qid, lone_qid] {
            queue.dequeue_where(|t| t.queue_id == qid).unwrap();
            queue.complete_task(qid, json!(null)).unwrap();
        }
        let dep_qid = queue.enqueue(dependent, 0).unwrap();

        let removed = queue.cleanup(chrono::Duration::zero());
        assert_eq!(removed, 1);
        assert!(queue.get(lone_qid).is_none());
        assert!(queue.get(base_qid).is_some());

        // The dependent can still run
        assert_eq!(queue.dequeue().unwrap().queue_id, dep_qid);
    }

    #[test]
    fn test_reset_and_remove_pending() {
        let mut queue = TaskQueue::default();
        let a = queue.enqueue(Task::new("A", ""), 0).unwrap();
        assert_eq!(queue.remove_pending(a).unwrap().task.title, "A");
        assert!(queue.get(a).is_none());

        queue.enqueue(Task::new("B", ""), 0).unwrap();
        queue.reset();
        assert_eq!(queue.total_count(), 0);
        assert_eq!(queue.enqueue(Task::new("C", ""), 0).unwrap(), QueueId(1));
    }

    #[test]
    fn test_recommended_assignment_respects_hints() {
        let mut queue = TaskQueue::default();
        let hinted = queue
            .enqueue(Task::new("A", "").with_assigned_agent("developer"), 0)
            .unwrap();
        let open = queue.enqueue(Task::new("B", ""), 0).unwrap();

        let mut busy = Agent::new("tester", "Tester", "QA Engineer");
        busy.status = crate::types::AgentStatus::Working;
        let agents = vec![
            Agent::new("developer", "Dev", "Developer"),
            Agent::new("architect", "Arch", "Architect"),
            busy,
        ];

        let plan = queue.recommended_assignment(&agents);
        assert_eq!(plan.get("developer"), Some(&vec![hinted, open]));
        assert_eq!(plan.get("architect"), Some(&vec![open]));
        assert!(!plan.contains_key("tester"));
    }

    #[test]
    fn test_find_by_task_and_all_tasks() {
        let mut queue = TaskQueue::default();
        let task = Task::new("A", "");
        let task_id = task.id;
        let qid = queue.enqueue(task, 0).unwrap();
        queue.enqueue(Task::new("B", ""), 0).unwrap();

        assert_eq!(queue.find_by_task(task_id).unwrap().queue_id, qid);
        let ids: Vec<QueueId> = queue.all_tasks().iter().map(|t| t.queue_id).collect();
        assert_eq!(ids, vec![QueueId(1), QueueId(2)]);
    }

    /// Random DAGs with edges pointing to earlier tasks only. Tasks are
    /// enqueued in shuffled order and completed in random order.
    #[test]
    fn test_random_dag_safety_and_liveness() {
        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let n = rng.gen_range(2..30);
            let mut tasks: Vec<Task> = Vec::with_capacity(n);
            for i in 0..n {
                let mut task = Task::new(format!("T{i}"), "")
                    .with_priority(match rng.gen_range(0..4) {
                        0 => Priority::Low,
                        1 => Priority::Medium,
                        2 => Priority::High,
                        _ => Priority::Critical,
                    });
                for prev in &tasks {
                    if rng.gen_bool(0.2) {
                        task.add_dependency(prev.id);
                    }
                }
                tasks.push(task);
            }
            assert!(!crate::validation::has_cycle(&tasks));

            let mut shuffled = tasks.clone();
            shuffled.shuffle(&mut rng);
            let mut queue = TaskQueue::default();
            for task in shuffled {
                queue.enqueue(task, rng.gen_range(-5..5)).unwrap();
            }

            let mut done: HashSet<TaskId> = HashSet::new();
            let mut running: Vec<QueuedTask> = Vec::new();
            let mut steps = 0;
            while !queue.is_drained() {
                steps += 1;
                assert!(steps < 10_000, "seed {seed}: no progress");

                while let Some(entry) = queue.dequeue() {
                    for dep in &entry.task.dependencies {
                        assert!(done.contains(dep), "seed {seed}: dependency not completed");
                    }
                    running.push(entry);
                }
                assert!(!running.is_empty(), "seed {seed}: stuck with pending tasks");

                let pick = rng.gen_range(0..running.len());
                let entry = running.swap_remove(pick);
                queue.complete_task(entry.queue_id, json!(null)).unwrap();
                done.insert(entry.id());
            }
            assert_eq!(done.len(), n, "seed {seed}");
        }
    }
}
