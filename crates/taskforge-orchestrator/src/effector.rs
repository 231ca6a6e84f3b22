use crate::config::SimulationConfig;
use crate::types::{Agent, Task};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use std::time::Duration;
use taskforge_core::{TaskforgeError, TaskforgeResult};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Executes the content of a task on behalf of an agent.
///
/// Implementations should return promptly once `cancel` fires; the
/// orchestrator discards any result produced after cancellation or timeout.
#[async_trait]
pub trait Effector: Send + Sync {
    async fn execute(
        &self,
        task: &Task,
        agent: &Agent,
        cancel: CancellationToken,
    ) -> TaskforgeResult<serde_json::Value>;
}

/// Stand-in effector that waits a random delay and returns a canned,
/// role-specific report.
pub struct SimulatedEffector {
    config: SimulationConfig,
}

impl SimulatedEffector {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    fn roll(&self, role: &str) -> (Duration, bool, String, f64) {
        let mut rng = rand::thread_rng();
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms.max(self.config.min_delay_ms));
        let delay = Duration::from_millis(rng.gen_range(min..=max));
        let fail = self.config.failure_rate > 0.0 && rng.gen_bool(self.config.failure_rate.min(1.0));

        let outputs = role_outputs(role, &mut rng);
        let output = outputs
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| "任务已完成".to_string());
        let quality = rng.gen_range(0.7..1.0);
        (delay, fail, output, quality)
    }
}

impl Default for SimulatedEffector {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

#[async_trait]
impl Effector for SimulatedEffector {
    async fn execute(
        &self,
        task: &Task,
        agent: &Agent,
        cancel: CancellationToken,
    ) -> TaskforgeResult<serde_json::Value> {
        let (delay, fail, output, quality) = self.roll(&agent.role);
        debug!(
            task_id = %task.id,
            agent_id = %agent.id,
            delay_ms = delay.as_millis() as u64,
            "SimulatedEffector: executing"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(TaskforgeError::Effector(format!("execution of '{}' cancelled", task.title)));
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if fail {
            return Err(TaskforgeError::Effector(format!(
                "simulated failure while executing '{}'",
                task.title
            )));
        }

        Ok(json!({
            "message": format!("任务 \"{}\" 已由 {} 完成", task.title, agent.name),
            "output": output,
            "quality": quality,
        }))
    }
}

fn role_outputs(role: &str, rng: &mut impl Rng) -> Vec<String> {
    match role {
        "Product Manager" => vec![
            format!("已完成需求分析，识别出{}个关键功能点", rng.gen_range(3..8)),
            "制定了详细的产品计划和时间表".to_string(),
            "编写了用户故事和验收标准".to_string(),
        ],
        "Architect" => vec![
            "设计了系统架构，采用微服务架构模式".to_string(),
            "完成了技术选型并给出推荐方案".to_string(),
            "制定了性能优化方案和安全策略".to_string(),
        ],
        "Developer" => vec![
            "完成了核心功能模块的开发".to_string(),
            "编写了单元测试，覆盖率达到90%以上".to_string(),
            "进行了代码审查，确保代码质量".to_string(),
        ],
        "QA Engineer" => vec![
            "制定了详细的测试计划".to_string(),
            "执行了功能测试和回归测试".to_string(),
            format!("发现了{}个缺陷并已修复", rng.gen_range(0..3)),
        ],
        "Technical Writer" => vec![
            "编写了用户手册和技术文档".to_string(),
            "完成了API文档的编写".to_string(),
            "制作了部署和运维指南".to_string(),
        ],
        _ => Vec::new(),
    }
}
