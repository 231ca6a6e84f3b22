use crate::alarm::Alarms;
use crate::config::{OrchestratorConfig, QueueConfig};
use crate::decomposer::{DecompositionContext, TaskDecomposer};
use crate::effector::{Effector, SimulatedEffector};
use crate::events::{EventBus, OrchestratorEvent};
use crate::matcher::{KeywordMatcher, Matcher};
use crate::profiles::default_agents;
use crate::registry::{AgentRegistry, RegistrySummary};
use crate::rules::default_rules;
use crate::task_queue::{FailOutcome, QueueStats, TaskQueue};
use crate::types::{Agent, QueuedTask, Task, TaskPlan, TaskStatus};
use crate::validation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Instant;
use taskforge_core::{AgentId, QueueId, TaskId, TaskforgeError, TaskforgeResult};
use tokio::sync::{broadcast, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The multi-agent scheduling engine.
///
/// Cheap to clone; all clones share one state guarded by a single mutex.
/// Dispatched tasks run on their own spawned execution units and report
/// back through the same lock.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: OrchestratorConfig,
    decomposer: TaskDecomposer,
    matcher: Arc<dyn Matcher>,
    effector: Arc<dyn Effector>,
    events: EventBus,
    state: Mutex<EngineState>,
    notify: Notify,
}

struct EngineState {
    queue: TaskQueue,
    registry: AgentRegistry,
    executions: HashMap<QueueId, Execution>,
    /// Cancelled execution units that have not returned yet. Their agents
    /// are still working.
    draining: usize,
    alarms: Alarms<QueueId>,
    plans: HashMap<Uuid, TaskPlan>,
    task_plan: HashMap<TaskId, Uuid>,
}

/// An agent bound to a running queue entry.
struct Execution {
    agent_id: AgentId,
    /// True when a spawned execution unit owns the effector call. The agent
    /// is then released by that unit when it returns.
    spawned: bool,
    cancel: CancellationToken,
}

enum Settle {
    Success { minutes: f64 },
    Failure,
    Cancelled,
}

/// Snapshot of the whole engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub agents: RegistrySummary,
    pub queue: QueueStats,
    pub plans: usize,
    pub executions: usize,
    pub max_concurrent_tasks: usize,
    pub queue_config: QueueConfig,
}

/// Result of running a plan to completion (or until it is blocked).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorResult {
    pub summary: String,
    pub plan: TaskPlan,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
    /// Tasks left pending because nothing could ever run them. After
    /// [`Orchestrator::run`] these have been cancelled.
    pub blocked_tasks: Vec<TaskId>,
    pub duration_ms: u64,
}

impl Orchestrator {
    /// Engine with the simulated effector and the keyword matcher.
    pub fn new(config: OrchestratorConfig) -> TaskforgeResult<Self> {
        let effector = Arc::new(SimulatedEffector::new(config.simulation.clone()));
        Self::with_parts(config, effector, Arc::new(KeywordMatcher::new()))
    }

    pub fn with_parts(
        config: OrchestratorConfig,
        effector: Arc<dyn Effector>,
        matcher: Arc<dyn Matcher>,
    ) -> TaskforgeResult<Self> {
        config.validate()?;

        let rules = if config.rules.is_empty() {
            default_rules()
        } else {
            config.rules.clone()
        };
        let agents = if config.agents.is_empty() {
            default_agents()
        } else {
            config.agents.clone()
        };

        let state = EngineState {
            queue: TaskQueue::new(config.queue.clone()),
            registry: AgentRegistry::with_agents(agents),
            executions: HashMap::new(),
            draining: 0,
            alarms: Alarms::new(),
            plans: HashMap::new(),
            task_plan: HashMap::new(),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                decomposer: TaskDecomposer::with_rules(rules, config.vocabulary.clone()),
                events: EventBus::new(config.event_capacity),
                config,
                matcher,
                effector,
                state: Mutex::new(state),
                notify: Notify::new(),
            }),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn decomposer(&self) -> &TaskDecomposer {
        &self.inner.decomposer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    // --- Agents ---

    pub async fn register_agent(&self, agent: Agent) -> TaskforgeResult<()> {
        let (agent_id, role) = (agent.id.clone(), agent.role.clone());
        self.inner.state.lock().await.registry.register(agent)?;
        self.inner
            .events
            .emit(OrchestratorEvent::AgentRegistered { agent_id, role });
        self.inner.notify.notify_one();
        Ok(())
    }

    pub async fn unregister_agent(&self, agent_id: &str) -> TaskforgeResult<Agent> {
        let agent = self.inner.state.lock().await.registry.unregister(agent_id)?;
        self.inner.events.emit(OrchestratorEvent::AgentUnregistered {
            agent_id: agent.id.clone(),
        });
        Ok(agent)
    }

    pub async fn agents(&self) -> Vec<Agent> {
        self.inner.state.lock().await.registry.all().to_vec()
    }

    pub async fn agent(&self, agent_id: &str) -> Option<Agent> {
        self.inner.state.lock().await.registry.get(agent_id).cloned()
    }

    /// First idle agent the matcher accepts, in registration order.
    pub async fn find_suitable_agent(&self, task: &Task) -> Option<Agent> {
        let state = self.inner.state.lock().await;
        state
            .registry
            .find_suitable_agent(task, self.inner.matcher.as_ref())
            .cloned()
    }

    // --- Planning ---

    pub fn decompose(&self, request: &str, context: &DecompositionContext) -> TaskPlan {
        self.inner.decomposer.decompose_plan(request, context)
    }

    /// Enqueue every task of a plan. Plans with a dependency cycle are
    /// rejected; if the queue fills up part way, nothing is enqueued.
    pub async fn submit_plan(&self, plan: TaskPlan) -> TaskforgeResult<Vec<QueueId>> {
        if let Some(path) = validation::find_cycle(&plan.tasks) {
            let joined: Vec<String> = path.iter().map(ToString::to_string).collect();
            warn!(plan_id = %plan.id, cycle = %joined.join(" -> "), "Orchestrator: rejecting plan");
            return Err(TaskforgeError::DependencyCycle(joined.join(" -> ")));
        }

        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let mut queued = Vec::with_capacity(plan.tasks.len());
        for task in &plan.tasks {
            match state.queue.enqueue(task.clone(), 0) {
                Ok(queue_id) => queued.push(queue_id),
                Err(e) => {
                    for queue_id in &queued {
                        state.queue.remove_pending(*queue_id);
                    }
                    return Err(e);
                }
            }
        }

        for (task, queue_id) in plan.tasks.iter().zip(&queued) {
            state.task_plan.insert(task.id, plan.id);
            self.inner.events.emit(OrchestratorEvent::TaskAdded {
                queue_id: *queue_id,
                task_id: task.id,
                title: task.title.clone(),
                priority: task.priority,
            });
        }

        info!(
            plan_id = %plan.id,
            title = %plan.title,
            task_count = plan.tasks.len(),
            "Orchestrator: plan submitted"
        );
        self.inner.events.emit(OrchestratorEvent::PlanCreated {
            plan_id: plan.id,
            title: plan.title.clone(),
            task_count: plan.tasks.len(),
        });
        state.plans.insert(plan.id, plan);
        self.inner.notify.notify_one();
        Ok(queued)
    }

    pub async fn plan(&self, plan_id: Uuid) -> Option<TaskPlan> {
        self.inner.state.lock().await.plans.get(&plan_id).cloned()
    }

    /// All plans, oldest first.
    pub async fn plans(&self) -> Vec<TaskPlan> {
        let state = self.inner.state.lock().await;
        let mut plans: Vec<TaskPlan> = state.plans.values().cloned().collect();
        plans.sort_by_key(|p| p.created_at);
        plans
    }

    // --- Queue operations ---

    pub async fn enqueue(&self, task: Task, priority: i64) -> TaskforgeResult<QueueId> {
        let (task_id, title, task_priority) = (task.id, task.title.clone(), task.priority);
        let queue_id = self.inner.state.lock().await.queue.enqueue(task, priority)?;
        self.inner.events.emit(OrchestratorEvent::TaskAdded {
            queue_id,
            task_id,
            title,
            priority: task_priority,
        });
        self.inner.notify.notify_one();
        Ok(queue_id)
    }

    /// Move the best runnable entry to running and arm its timeout. No agent
    /// is bound; follow up with [`Orchestrator::assign`].
    pub async fn dequeue(&self) -> Option<QueuedTask> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let entry = state.queue.dequeue()?;
        self.inner.arm_timeout(state, entry.queue_id, entry.attempt);
        Some(entry)
    }

    /// Bind an idle agent to a running entry taken with [`Orchestrator::dequeue`].
    pub async fn assign(&self, queue_id: QueueId, agent_id: &str) -> TaskforgeResult<Task> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        if state.executions.contains_key(&queue_id) {
            return Err(TaskforgeError::InvalidTransition {
                queue_id,
                expected: "unassigned",
            });
        }
        let (task, _) = self.inner.bind(state, queue_id, agent_id, false)?;
        Ok(task)
    }

    pub async fn complete_task(
        &self,
        queue_id: QueueId,
        result: serde_json::Value,
    ) -> TaskforgeResult<QueuedTask> {
        let mut guard = self.inner.state.lock().await;
        self.inner.finish_success(&mut guard, queue_id, result, false)
    }

    pub async fn fail_task(
        &self,
        queue_id: QueueId,
        error: impl Into<String>,
    ) -> TaskforgeResult<FailOutcome> {
        let mut guard = self.inner.state.lock().await;
        self.inner.finish_failure(&mut guard, queue_id, error.into(), false)
    }

    /// Cancel a pending or running entry. A running effector call is
    /// signalled and its late result discarded.
    pub async fn cancel_task(&self, queue_id: QueueId) -> bool {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        if !state.queue.cancel_task(queue_id) {
            return false;
        }
        state.alarms.disarm(&queue_id);
        self.inner.settle(state, queue_id, Settle::Cancelled, false);

        if let Some(entry) = state.queue.get(queue_id).cloned() {
            self.inner.events.emit(OrchestratorEvent::TaskCancelled {
                queue_id,
                task_id: entry.id(),
            });
            self.inner.sync_plan(state, &entry.task);
        }
        self.inner.notify.notify_one();
        true
    }

    pub async fn task(&self, queue_id: QueueId) -> Option<QueuedTask> {
        self.inner.state.lock().await.queue.get(queue_id).cloned()
    }

    pub async fn all_tasks(&self) -> Vec<QueuedTask> {
        let state = self.inner.state.lock().await;
        state.queue.all_tasks().into_iter().cloned().collect()
    }

    pub async fn stats(&self) -> QueueStats {
        self.inner.state.lock().await.queue.stats()
    }

    pub async fn system_status(&self) -> SystemStatus {
        let state = self.inner.state.lock().await;
        SystemStatus {
            agents: state.registry.summary(),
            queue: state.queue.stats(),
            plans: state.plans.len(),
            executions: state.executions.len(),
            max_concurrent_tasks: self.inner.config.max_concurrent_tasks,
            queue_config: self.inner.config.queue.clone(),
        }
    }

    /// Idle agent → runnable queue ids it could take.
    pub async fn recommended_assignment(&self) -> BTreeMap<AgentId, Vec<QueueId>> {
        let state = self.inner.state.lock().await;
        state.queue.recommended_assignment(state.registry.all())
    }

    pub async fn cleanup(&self, max_age: chrono::Duration) -> usize {
        self.inner.state.lock().await.queue.cleanup(max_age)
    }

    /// Drop all queue entries and plans. In-flight executions are cancelled.
    pub async fn reset(&self) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let running: Vec<QueueId> = state.executions.keys().copied().collect();
        for queue_id in running {
            self.inner.settle(state, queue_id, Settle::Cancelled, false);
        }
        state.alarms.clear();
        state.queue.reset();
        state.plans.clear();
        state.task_plan.clear();
        info!("Orchestrator: reset");
    }

    // --- Execution ---

    /// Pair runnable entries with idle agents and start them, up to
    /// `max_concurrent_tasks`. Returns how many were started.
    pub async fn dispatch_ready(&self) -> TaskforgeResult<usize> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        let matcher = self.inner.matcher.as_ref();
        let mut started = 0;

        while state.queue.running_count() < self.inner.config.max_concurrent_tasks {
            let registry = &state.registry;
            let mut chosen: Option<AgentId> = None;
            let picked = state.queue.dequeue_where(|t| {
                match registry.find_suitable_agent(&t.task, matcher) {
                    Some(agent) => {
                        chosen = Some(agent.id.clone());
                        true
                    }
                    None => false,
                }
            });
            let (Some(entry), Some(agent_id)) = (picked, chosen) else {
                break;
            };

            self.inner.arm_timeout(state, entry.queue_id, entry.attempt);
            let (task, cancel) = self.inner.bind(state, entry.queue_id, &agent_id, true)?;
            let agent = state
                .registry
                .get(&agent_id)
                .cloned()
                .ok_or_else(|| TaskforgeError::AgentNotFound(agent_id.clone()))?;
            self.inner
                .spawn_execution(entry.queue_id, task, agent, cancel);
            started += 1;
        }

        if started > 0 {
            debug!(started, "Orchestrator: dispatched tasks");
        }
        Ok(started)
    }

    /// Drive a submitted plan until every task is terminal, or until nothing
    /// is running, nothing can be dispatched and no retry is pending.
    pub async fn run_plan(&self, plan_id: Uuid) -> TaskforgeResult<OrchestratorResult> {
        let start = Instant::now();
        info!(plan_id = %plan_id, "Orchestrator: running plan");

        loop {
            let dispatched = self.dispatch_ready().await?;

            let next_retry = {
                let state = self.inner.state.lock().await;
                let plan = state.plans.get(&plan_id).ok_or_else(|| {
                    TaskforgeError::Orchestrator(format!("Unknown plan: {plan_id}"))
                })?;

                if plan.tasks.iter().all(|t| t.status.is_terminal()) {
                    break;
                }

                let next_retry = state.queue.next_retry_at();
                let idle = state.queue.running_count() == 0 && state.draining == 0;
                if idle && dispatched == 0 && next_retry.is_none() {
                    warn!(plan_id = %plan_id, "Orchestrator: plan blocked, no task can make progress");
                    break;
                }
                next_retry
            };

            let mut wait = self.inner.config.poll_interval();
            if let Some(at) = next_retry {
                wait = wait.min(at.saturating_duration_since(Instant::now()));
            }
            tokio::select! {
                _ = self.inner.notify.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let state = self.inner.state.lock().await;
        let result = collect_result(&state, plan_id, start)?;
        info!(
            plan_id = %plan_id,
            duration_ms = result.duration_ms,
            completed = result.completed_tasks,
            failed = result.failed_tasks,
            blocked = result.blocked_tasks.len(),
            "Orchestrator: plan finished"
        );
        Ok(result)
    }

    /// Decompose, submit and run a request. Tasks left blocked are cancelled
    /// so the plan ends in a terminal state.
    pub async fn run<I, S>(&self, request: &str, constraints: I) -> TaskforgeResult<OrchestratorResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let start = Instant::now();
        info!(request = %request, "Orchestrator: starting pipeline");

        let plan = self.decompose(request, &DecompositionContext::with_constraints(constraints));
        let report = self.inner.decomposer.validate(&plan.tasks);
        for issue in &report.issues {
            warn!(plan_id = %plan.id, issue = %issue, "Orchestrator: plan validation");
        }

        let plan_id = plan.id;
        self.submit_plan(plan).await?;
        let result = self.run_plan(plan_id).await?;
        if result.blocked_tasks.is_empty() {
            return Ok(result);
        }

        let state = self.inner.state.lock().await;
        let blocked: Vec<QueueId> = result
            .blocked_tasks
            .iter()
            .filter_map(|id| state.queue.find_by_task(*id).map(|t| t.queue_id))
            .collect();
        drop(state);
        for queue_id in blocked {
            self.cancel_task(queue_id).await;
        }

        let state = self.inner.state.lock().await;
        let mut rebuilt = collect_result(&state, plan_id, start)?;
        rebuilt.blocked_tasks = result.blocked_tasks;
        Ok(rebuilt)
    }
}

impl Inner {
    /// Bind an agent to a running entry and record the execution.
    fn bind(
        &self,
        state: &mut EngineState,
        queue_id: QueueId,
        agent_id: &str,
        spawned: bool,
    ) -> TaskforgeResult<(Task, CancellationToken)> {
        let entry = state
            .queue
            .running_mut(queue_id)
            .ok_or(TaskforgeError::InvalidTransition {
                queue_id,
                expected: "running",
            })?;
        state.registry.assign(&mut entry.task, agent_id)?;
        let task = entry.task.clone();
        let attempt = entry.attempt;

        let cancel = CancellationToken::new();
        state.executions.insert(
            queue_id,
            Execution {
                agent_id: agent_id.to_string(),
                spawned,
                cancel: cancel.clone(),
            },
        );

        self.events.emit(OrchestratorEvent::TaskStarted {
            queue_id,
            task_id: task.id,
            agent_id: agent_id.to_string(),
            attempt,
        });
        self.sync_plan(state, &task);
        Ok((task, cancel))
    }

    fn arm_timeout(self: &Arc<Self>, state: &mut EngineState, queue_id: QueueId, attempt: u32) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        state
            .alarms
            .arm(queue_id, self.config.queue.timeout(), move |generation| async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_timeout(queue_id, attempt, generation).await;
                }
            });
    }

    async fn on_timeout(&self, queue_id: QueueId, attempt: u32, generation: u64) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.alarms.fired(&queue_id, generation);

        match state.queue.expire(queue_id, attempt) {
            Ok(Some(outcome)) => self.after_failure(state, outcome, false),
            Ok(None) => {}
            Err(e) => error!(queue_id = %queue_id, error = %e, "Orchestrator: timeout handling failed"),
        }
    }

    fn spawn_execution(
        self: &Arc<Self>,
        queue_id: QueueId,
        task: Task,
        agent: Agent,
        cancel: CancellationToken,
    ) {
        let weak = Arc::downgrade(self);
        let effector = Arc::clone(&self.effector);

        tokio::spawn(async move {
            // The effector may ignore the token, so the unit stops waiting on it.
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = effector.execute(&task, &agent, cancel.clone()) => Some(result),
            };
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut guard = inner.state.lock().await;
            let state = &mut *guard;

            let result = match result {
                Some(result) if !cancel.is_cancelled() => result,
                _ => {
                    debug!(
                        queue_id = %queue_id,
                        agent_id = %agent.id,
                        "Orchestrator: discarding result of cancelled execution"
                    );
                    state.draining = state.draining.saturating_sub(1);
                    if let Err(e) = state.registry.release(&agent.id) {
                        warn!(agent_id = %agent.id, error = %e, "Orchestrator: could not release agent");
                    }
                    inner.notify.notify_one();
                    return;
                }
            };

            let outcome = match result {
                Ok(value) => inner.finish_success(state, queue_id, value, true).map(|_| ()),
                Err(e) => inner
                    .finish_failure(state, queue_id, e.to_string(), true)
                    .map(|_| ()),
            };
            if let Err(e) = outcome {
                error!(queue_id = %queue_id, error = %e, "Orchestrator: could not record result");
            }
        });
    }

    fn finish_success(
        &self,
        state: &mut EngineState,
        queue_id: QueueId,
        result: serde_json::Value,
        from_unit: bool,
    ) -> TaskforgeResult<QueuedTask> {
        let entry = state.queue.complete_task(queue_id, result)?;
        state.alarms.disarm(&queue_id);

        let minutes = entry.task.actual_duration.unwrap_or(0) as f64;
        self.settle(state, queue_id, Settle::Success { minutes }, from_unit);

        self.events.emit(OrchestratorEvent::TaskCompleted {
            queue_id,
            task_id: entry.id(),
            agent_id: entry.task.assigned_agent.clone(),
            result: entry.task.result.clone().unwrap_or_default(),
            actual_duration: entry.task.actual_duration,
        });
        self.sync_plan(state, &entry.task);
        self.notify.notify_one();
        Ok(entry)
    }

    fn finish_failure(
        &self,
        state: &mut EngineState,
        queue_id: QueueId,
        error: String,
        from_unit: bool,
    ) -> TaskforgeResult<FailOutcome> {
        let outcome = state.queue.fail_task(queue_id, error)?;
        self.after_failure(state, outcome.clone(), from_unit);
        Ok(outcome)
    }

    fn after_failure(&self, state: &mut EngineState, outcome: FailOutcome, from_unit: bool) {
        let entry = outcome.task();
        let queue_id = entry.queue_id;
        state.alarms.disarm(&queue_id);
        self.settle(state, queue_id, Settle::Failure, from_unit);

        let error = entry.task.error.clone().unwrap_or_default();
        let event = match &outcome {
            FailOutcome::Retrying(t) => OrchestratorEvent::TaskRetrying {
                queue_id,
                task_id: t.id(),
                error,
                retry_count: t.retry_count,
            },
            FailOutcome::Exhausted(t) => {
                if let Some(e) = outcome.exhausted_error() {
                    error!(queue_id = %queue_id, task_id = %t.id(), error = %e, "Orchestrator: task failed");
                }
                OrchestratorEvent::TaskFailed {
                    queue_id,
                    task_id: t.id(),
                    error,
                    retries: t.retry_count,
                }
            }
        };
        self.events.emit(event);
        self.sync_plan(state, &entry.task);
        self.notify.notify_one();
    }

    /// Remove the execution bound to `queue_id`, record the agent metric and
    /// free the agent. When a spawned unit is still running and this is not
    /// that unit reporting, the unit is cancelled and frees the agent itself
    /// once it returns.
    fn settle(&self, state: &mut EngineState, queue_id: QueueId, settle: Settle, from_unit: bool) {
        let Some(execution) = state.executions.remove(&queue_id) else {
            return;
        };
        let agent_id = execution.agent_id.as_str();

        let settled = if execution.spawned && !from_unit {
            execution.cancel.cancel();
            state.draining += 1;
            match settle {
                Settle::Success { minutes } => state.registry.record_success(agent_id, minutes),
                Settle::Failure => state.registry.record_failure(agent_id),
                Settle::Cancelled => Ok(()),
            }
        } else {
            match settle {
                Settle::Success { minutes } => state.registry.release_success(agent_id, minutes),
                Settle::Failure => state.registry.release_failure(agent_id),
                Settle::Cancelled => state.registry.release(agent_id),
            }
        };
        if let Err(e) = settled {
            warn!(agent_id, error = %e, "Orchestrator: could not settle agent");
        }
    }

    /// Copy a task snapshot into its plan and refresh the plan's progress.
    fn sync_plan(&self, state: &mut EngineState, task: &Task) {
        let Some(plan_id) = state.task_plan.get(&task.id).copied() else {
            return;
        };
        let Some(plan) = state.plans.get_mut(&plan_id) else {
            return;
        };
        if let Some(slot) = plan.task_mut(task.id) {
            *slot = task.clone();
        }

        let before = (plan.status, plan.progress);
        plan.update_progress();
        if (plan.status, plan.progress) != before {
            debug!(plan_id = %plan_id, status = ?plan.status, progress = plan.progress, "Orchestrator: plan updated");
            self.events.emit(OrchestratorEvent::PlanUpdated {
                plan_id,
                status: plan.status,
                progress: plan.progress,
            });
        }
    }
}

fn collect_result(
    state: &EngineState,
    plan_id: Uuid,
    start: Instant,
) -> TaskforgeResult<OrchestratorResult> {
    let plan = state
        .plans
        .get(&plan_id)
        .cloned()
        .ok_or_else(|| TaskforgeError::Orchestrator(format!("Unknown plan: {plan_id}")))?;

    let count = |status: TaskStatus| plan.tasks.iter().filter(|t| t.status == status).count();
    let completed = count(TaskStatus::Completed);
    let failed = count(TaskStatus::Failed);
    let cancelled = count(TaskStatus::Cancelled);
    let blocked: Vec<TaskId> = plan
        .tasks
        .iter()
        .filter(|t| !t.status.is_terminal())
        .map(|t| t.id)
        .collect();

    let summary = format!(
        "Orchestration complete: {}/{} tasks completed, {} failed, {} cancelled, {} blocked",
        completed,
        plan.tasks.len(),
        failed,
        cancelled,
        blocked.len()
    );

    Ok(OrchestratorResult {
        summary,
        total_tasks: plan.tasks.len(),
        completed_tasks: completed,
        failed_tasks: failed,
        cancelled_tasks: cancelled,
        blocked_tasks: blocked,
        duration_ms: start.elapsed().as_millis() as u64,
        plan,
    })
}
