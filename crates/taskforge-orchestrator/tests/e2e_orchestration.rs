//! End-to-end scheduling tests.
//!
//! Drives the engine through decomposition, dispatch, execution, timeouts,
//! retries and cancellation using in-process effectors.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskforge_core::{QueueId, TaskforgeError, TaskforgeResult};
use taskforge_orchestrator::*;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Test effectors
// ---------------------------------------------------------------------------

/// Succeeds after a short sleep and records peak concurrency.
#[derive(Default)]
struct CountingEffector {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl Effector for CountingEffector {
    async fn execute(
        &self,
        task: &Task,
        agent: &Agent,
        _cancel: CancellationToken,
    ) -> TaskforgeResult<serde_json::Value> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({ "task": task.title, "agent": agent.id }))
    }
}

/// Hangs until cancelled on the first call, succeeds afterwards.
#[derive(Default)]
struct HangOnceEffector {
    calls: AtomicU32,
}

#[async_trait]
impl Effector for HangOnceEffector {
    async fn execute(
        &self,
        _task: &Task,
        _agent: &Agent,
        cancel: CancellationToken,
    ) -> TaskforgeResult<serde_json::Value> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            cancel.cancelled().await;
            return Err(TaskforgeError::Effector("cancelled".into()));
        }
        Ok(json!("done"))
    }
}

/// Hangs until cancelled, every time.
struct BlockingEffector;

#[async_trait]
impl Effector for BlockingEffector {
    async fn execute(
        &self,
        _task: &Task,
        _agent: &Agent,
        cancel: CancellationToken,
    ) -> TaskforgeResult<serde_json::Value> {
        cancel.cancelled().await;
        Err(TaskforgeError::Effector("cancelled".into()))
    }
}

/// Never returns and never looks at its token.
struct DeafEffector;

#[async_trait]
impl Effector for DeafEffector {
    async fn execute(
        &self,
        _task: &Task,
        _agent: &Agent,
        _cancel: CancellationToken,
    ) -> TaskforgeResult<serde_json::Value> {
        std::future::pending().await
    }
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        queue: QueueConfig {
            retry_delay_ms: 0,
            ..QueueConfig::default()
        },
        poll_interval_ms: 10,
        simulation: SimulationConfig {
            min_delay_ms: 1,
            max_delay_ms: 5,
            failure_rate: 0.0,
        },
        ..OrchestratorConfig::default()
    }
}

fn engine_with(config: OrchestratorConfig, effector: Arc<dyn Effector>) -> Orchestrator {
    Orchestrator::with_parts(config, effector, Arc::new(KeywordMatcher::new())).unwrap()
}

fn drain(rx: &mut broadcast::Receiver<OrchestratorEvent>) -> Vec<OrchestratorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn wait_until_idle(orch: &Orchestrator, agent_id: &str) {
    for _ in 0..200 {
        if orch.agent(agent_id).await.unwrap().is_idle() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("agent {agent_id} never became idle");
}

// ---------------------------------------------------------------------------
// 1. Complex request runs to completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_complex_request_completes() {
    let orch = Orchestrator::new(fast_config()).unwrap();
    let result = orch.run("开发电商平台系统", ["质量优先"]).await.unwrap();

    assert_eq!(result.total_tasks, 7);
    assert_eq!(result.completed_tasks, 7);
    assert_eq!(result.failed_tasks, 0);
    assert!(result.blocked_tasks.is_empty());
    assert_eq!(result.plan.status, PlanStatus::Completed);
    assert_eq!(result.plan.progress, 100);
    assert!(result.plan.completed_at.is_some());
    assert!(result.summary.starts_with("Orchestration complete: 7/7"));

    // The summary task ran last
    let summary = result.plan.tasks.last().unwrap();
    for task in &result.plan.tasks[..6] {
        assert!(task.completed_at.unwrap() <= summary.started_at.unwrap());
    }

    let status = orch.system_status().await;
    assert_eq!(status.agents.working, 0);
    assert_eq!(status.queue.completed, 7);
    assert_eq!(status.executions, 0);
}

// ---------------------------------------------------------------------------
// 2. Event feed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_event_feed_for_single_task() {
    let orch = Orchestrator::new(fast_config()).unwrap();
    let mut rx = orch.subscribe();
    let result = orch.run("开发登录功能", Vec::<String>::new()).await.unwrap();
    assert_eq!(result.completed_tasks, 1);

    let events = drain(&mut rx);
    let kinds: Vec<String> = events
        .iter()
        .map(|e| serde_json::to_value(e).unwrap()["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "task-added",
            "plan-created",
            "task-started",
            "plan-updated",
            "task-completed",
            "plan-updated",
        ]
    );

    match &events[2] {
        OrchestratorEvent::TaskStarted {
            agent_id, attempt, ..
        } => {
            assert_eq!(agent_id, "developer");
            assert_eq!(*attempt, 1);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match events.last().unwrap() {
        OrchestratorEvent::PlanUpdated {
            status, progress, ..
        } => {
            assert_eq!(*status, PlanStatus::Completed);
            assert_eq!(*progress, 100);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// 3. Timeout triggers an automatic retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_timeout_retries_and_succeeds() {
    let mut config = fast_config();
    config.queue.timeout_ms = 50;
    let effector = Arc::new(HangOnceEffector::default());
    let orch = engine_with(config, effector.clone());
    let mut rx = orch.subscribe();

    let result = orch.run("开发登录功能", Vec::<String>::new()).await.unwrap();
    assert_eq!(result.completed_tasks, 1);
    assert_eq!(effector.calls.load(Ordering::SeqCst), 2);

    let entry = orch.task(QueueId(1)).await.unwrap();
    assert_eq!(entry.retry_count, 1);
    assert_eq!(entry.attempt, 2);

    let retried = drain(&mut rx).into_iter().find_map(|e| match e {
        OrchestratorEvent::TaskRetrying { error, .. } => Some(error),
        _ => None,
    });
    assert_eq!(retried.as_deref(), Some("Task task_1 execution timeout"));

    wait_until_idle(&orch, "developer").await;
    let developer = orch.agent("developer").await.unwrap();
    assert_eq!(developer.performance.tasks_completed, 1);
    assert!(developer.performance.success_rate < 1.0);
}

#[tokio::test]
async fn test_timeout_frees_agent_when_effector_ignores_cancel() {
    let mut config = fast_config();
    config.queue.timeout_ms = 50;
    config.queue.max_retries = 0;
    let orch = engine_with(config, Arc::new(DeafEffector));

    let result = tokio::time::timeout(
        Duration::from_secs(3),
        orch.run("开发登录功能", Vec::<String>::new()),
    )
    .await
    .expect("run should finish")
    .unwrap();
    assert_eq!(result.failed_tasks, 1);

    wait_until_idle(&orch, "developer").await;
    let developer = orch.agent("developer").await.unwrap();
    assert!(developer.current_task.is_none());
    assert!(developer.performance.success_rate < 1.0);
}

#[tokio::test]
async fn test_retry_dispatches_when_effector_ignores_cancel() {
    let mut config = fast_config();
    config.queue.timeout_ms = 50;
    config.queue.max_retries = 1;
    let orch = engine_with(config, Arc::new(DeafEffector));
    let mut rx = orch.subscribe();

    let result = tokio::time::timeout(
        Duration::from_secs(3),
        orch.run("开发登录功能", Vec::<String>::new()),
    )
    .await
    .expect("run should finish")
    .unwrap();
    assert_eq!(result.failed_tasks, 1);
    assert!(result.blocked_tasks.is_empty());

    let entry = orch.task(QueueId(1)).await.unwrap();
    assert_eq!(entry.retry_count, 1);
    assert_eq!(entry.attempt, 2);

    let started = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, OrchestratorEvent::TaskStarted { .. }))
        .count();
    assert_eq!(started, 2);

    wait_until_idle(&orch, "developer").await;
    assert_eq!(orch.stats().await.running, 0);
}

#[tokio::test]
async fn test_response_time_tracks_actual_duration() {
    let orch = engine_with(fast_config(), Arc::new(CountingEffector::default()));
    let result = orch.run("开发登录功能", Vec::<String>::new()).await.unwrap();
    assert_eq!(result.completed_tasks, 1);

    let entry = orch.task(QueueId(1)).await.unwrap();
    let actual = entry.task.actual_duration.unwrap();
    wait_until_idle(&orch, "developer").await;
    let developer = orch.agent("developer").await.unwrap();
    assert_eq!(developer.performance.tasks_completed, 1);
    assert_eq!(developer.performance.average_response_time, actual as f64);
}

// ---------------------------------------------------------------------------
// 4. Cancelling a running task
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cancel_running_task() {
    let orch = engine_with(fast_config(), Arc::new(BlockingEffector));
    let mut rx = orch.subscribe();

    let plan = orch.decompose("开发登录功能", &DecompositionContext::default());
    let plan_id = plan.id;
    let queued = orch.submit_plan(plan).await.unwrap();

    let runner = orch.clone();
    let handle = tokio::spawn(async move { runner.run_plan(plan_id).await });

    loop {
        if let OrchestratorEvent::TaskStarted { queue_id, .. } = rx.recv().await.unwrap() {
            assert_eq!(queue_id, queued[0]);
            break;
        }
    }
    assert!(orch.cancel_task(queued[0]).await);
    assert!(!orch.cancel_task(queued[0]).await);

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.cancelled_tasks, 1);
    assert_eq!(result.plan.status, PlanStatus::Failed);

    wait_until_idle(&orch, "developer").await;
    assert_eq!(orch.stats().await.cancelled, 1);
}

// ---------------------------------------------------------------------------
// 5. Retries exhausted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failures_exhaust_retries() {
    let mut config = fast_config();
    config.queue.max_retries = 1;
    config.simulation.failure_rate = 1.0;
    let orch = Orchestrator::new(config).unwrap();
    let mut rx = orch.subscribe();

    let result = orch.run("开发登录功能", Vec::<String>::new()).await.unwrap();
    assert_eq!(result.failed_tasks, 1);
    assert_eq!(result.plan.status, PlanStatus::Failed);

    let events = drain(&mut rx);
    let retrying = events
        .iter()
        .filter(|e| matches!(e, OrchestratorEvent::TaskRetrying { .. }))
        .count();
    assert_eq!(retrying, 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, OrchestratorEvent::TaskFailed { retries: 1, .. })));

    let developer = orch.agent("developer").await.unwrap();
    assert!(developer.is_idle());
    assert!(developer.performance.success_rate < 1.0);
}

#[tokio::test]
async fn test_dependents_of_failed_task_are_cancelled() {
    let mut config = fast_config();
    config.queue.max_retries = 0;
    config.simulation.failure_rate = 1.0;
    let orch = Orchestrator::new(config).unwrap();

    let result = orch
        .run("开发登录功能，测试支付模块", Vec::<String>::new())
        .await
        .unwrap();
    assert!(result.total_tasks >= 2);
    assert_eq!(result.completed_tasks, 0);
    assert!(result.failed_tasks >= 1);
    assert_eq!(
        result.failed_tasks + result.cancelled_tasks,
        result.total_tasks
    );
    assert_eq!(result.blocked_tasks.len(), result.cancelled_tasks);
    assert!(result.plan.tasks.iter().all(|t| t.status.is_terminal()));
}

// ---------------------------------------------------------------------------
// 6. No suitable agent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unmatched_task_is_blocked_then_cancelled() {
    let mut config = fast_config();
    config.agents = vec![Agent::new("writer", "文档工程师", "Technical Writer")];
    let orch = Orchestrator::new(config).unwrap();

    let result = orch.run("开发登录功能", Vec::<String>::new()).await.unwrap();
    assert_eq!(result.blocked_tasks.len(), 1);
    assert_eq!(result.cancelled_tasks, 1);
    assert_eq!(result.completed_tasks, 0);
    assert!(orch.agent("writer").await.unwrap().is_idle());
}

#[tokio::test]
async fn test_registered_agent_picks_up_work() {
    let orch = Orchestrator::new(fast_config()).unwrap();
    let plan = TaskPlan::new("部署网站", "部署", "", vec![Task::new("部署网站", "上线")]);
    assert!(orch.find_suitable_agent(&plan.tasks[0]).await.is_none());

    orch.register_agent(
        Agent::new("ops", "运维工程师", "Operator").with_capabilities(["部署"]),
    )
    .await
    .unwrap();

    let plan_id = plan.id;
    orch.submit_plan(plan).await.unwrap();
    let result = orch.run_plan(plan_id).await.unwrap();
    assert_eq!(result.completed_tasks, 1);
    assert_eq!(result.plan.tasks[0].assigned_agent.as_deref(), Some("ops"));

    let ops = orch.unregister_agent("ops").await.unwrap();
    assert_eq!(ops.performance.tasks_completed, 1);
    assert!(orch.agent("ops").await.is_none());
}

// ---------------------------------------------------------------------------
// 7. Queue ordering through the engine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_priority_mode_and_fifo_mode() {
    let orch = Orchestrator::new(fast_config()).unwrap();
    orch.enqueue(Task::new("低", "").with_priority(Priority::Low), 0)
        .await
        .unwrap();
    let critical = orch
        .enqueue(Task::new("急", "").with_priority(Priority::Critical), 0)
        .await
        .unwrap();
    assert_eq!(orch.dequeue().await.unwrap().queue_id, critical);

    let mut config = fast_config();
    config.queue.priority_mode = false;
    let fifo = Orchestrator::new(config).unwrap();
    let first = fifo
        .enqueue(Task::new("低", "").with_priority(Priority::Low), 0)
        .await
        .unwrap();
    fifo.enqueue(Task::new("急", "").with_priority(Priority::Critical), 0)
        .await
        .unwrap();
    assert_eq!(fifo.dequeue().await.unwrap().queue_id, first);
}

// ---------------------------------------------------------------------------
// 8. Random DAGs: dependencies respected, concurrency bounded, all complete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_random_dags_complete_in_dependency_order() {
    let titles = ["开发模块", "测试模块", "编写文档", "系统设计", "需求分析"];

    for seed in 0..5u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tasks: Vec<Task> = Vec::new();
        for i in 0..20 {
            let mut task = Task::new(format!("{}{i}", titles[rng.gen_range(0..titles.len())]), "");
            for prev in &tasks {
                if rng.gen_bool(0.15) {
                    task.add_dependency(prev.id);
                }
            }
            tasks.push(task);
        }

        let mut config = fast_config();
        config.max_concurrent_tasks = 2;
        let effector = Arc::new(CountingEffector::default());
        let orch = engine_with(config, effector.clone());

        let plan = TaskPlan::new("random", "random", "", tasks);
        let plan_id = plan.id;
        orch.submit_plan(plan).await.unwrap();
        let result = orch.run_plan(plan_id).await.unwrap();

        assert_eq!(result.completed_tasks, 20, "seed {seed}");
        assert_eq!(effector.calls.load(Ordering::SeqCst), 20);
        assert!(effector.peak.load(Ordering::SeqCst) <= 2);

        for task in &result.plan.tasks {
            let started = task.started_at.unwrap();
            for dep in &task.dependencies {
                let dep = result.plan.task(*dep).unwrap();
                assert!(dep.completed_at.unwrap() <= started, "seed {seed}");
            }
        }
    }
}
