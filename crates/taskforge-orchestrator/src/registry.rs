use crate::matcher::Matcher;
use crate::types::{Agent, AgentStatus, Task, TaskStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskforge_core::{AgentId, TaskforgeError, TaskforgeResult};
use tracing::{debug, info, warn};

/// Agent counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub total: usize,
    pub idle: usize,
    pub working: usize,
    pub error: usize,
}

/// Tracks registered agents, their status and performance.
///
/// Agents are kept in registration order, which is also the tie-break order
/// for [`AgentRegistry::find_suitable_agent`].
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: Vec<Agent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agents(agents: impl IntoIterator<Item = Agent>) -> Self {
        let mut registry = Self::new();
        for agent in agents {
            // a fresh registry has no working agents, so this cannot fail
            let _ = registry.register(agent);
        }
        registry
    }

    /// Add an agent, or replace an idle agent registered under the same id
    /// in place.
    pub fn register(&mut self, agent: Agent) -> TaskforgeResult<()> {
        if let Some(existing) = self.agents.iter_mut().find(|a| a.id == agent.id) {
            if existing.status == AgentStatus::Working {
                return Err(TaskforgeError::AgentBusy(agent.id));
            }
            info!(agent_id = %agent.id, role = %agent.role, "AgentRegistry: replaced agent");
            *existing = agent;
        } else {
            info!(agent_id = %agent.id, role = %agent.role, "AgentRegistry: registered agent");
            self.agents.push(agent);
        }
        Ok(())
    }

    /// Remove an agent. Refused while it is working on a task.
    pub fn unregister(&mut self, agent_id: &str) -> TaskforgeResult<Agent> {
        let index = self
            .agents
            .iter()
            .position(|a| a.id == agent_id)
            .ok_or_else(|| TaskforgeError::AgentNotFound(agent_id.to_string()))?;

        if self.agents[index].status == AgentStatus::Working {
            warn!(agent_id, "AgentRegistry: refusing to unregister working agent");
            return Err(TaskforgeError::AgentBusy(agent_id.to_string()));
        }

        info!(agent_id, "AgentRegistry: unregistered agent");
        Ok(self.agents.remove(index))
    }

    pub fn get(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    pub fn all(&self) -> &[Agent] {
        &self.agents
    }

    /// Idle agents, in registration order.
    pub fn available(&self) -> Vec<&Agent> {
        self.agents.iter().filter(|a| a.is_idle()).collect()
    }

    /// First idle agent the matcher accepts for `task`.
    pub fn find_suitable_agent(&self, task: &Task, matcher: &dyn Matcher) -> Option<&Agent> {
        self.agents
            .iter()
            .filter(|a| a.is_idle())
            .find(|a| matcher.is_suitable(a, task))
    }

    /// Bind an idle agent to a task, updating both sides together.
    pub fn assign(&mut self, task: &mut Task, agent_id: &str) -> TaskforgeResult<()> {
        let agent = self.get_mut(agent_id)?;
        if !agent.is_idle() {
            return Err(TaskforgeError::AgentBusy(agent_id.to_string()));
        }

        agent.status = AgentStatus::Working;
        agent.current_task = Some(task.id);

        task.status = TaskStatus::Running;
        task.assigned_agent = Some(agent.id.clone());
        task.started_at.get_or_insert_with(Utc::now);

        info!(agent_id, task_id = %task.id, title = %task.title, "AgentRegistry: agent working");
        Ok(())
    }

    /// Return an agent to idle after a successful task of `duration` minutes.
    pub fn release_success(&mut self, agent_id: &str, duration: f64) -> TaskforgeResult<()> {
        let agent = self.get_mut(agent_id)?;
        agent.performance.record_success(duration);
        Self::make_idle(agent);
        debug!(
            agent_id,
            tasks_completed = agent.performance.tasks_completed,
            average_response_time = agent.performance.average_response_time,
            "AgentRegistry: recorded success"
        );
        Ok(())
    }

    /// Return an agent to idle after a failed attempt.
    pub fn release_failure(&mut self, agent_id: &str) -> TaskforgeResult<()> {
        let agent = self.get_mut(agent_id)?;
        agent.performance.record_failure();
        Self::make_idle(agent);
        debug!(
            agent_id,
            success_rate = agent.performance.success_rate,
            "AgentRegistry: recorded failure"
        );
        Ok(())
    }

    /// Record a success without freeing the agent (it is still executing).
    pub fn record_success(&mut self, agent_id: &str, duration: f64) -> TaskforgeResult<()> {
        self.get_mut(agent_id)?.performance.record_success(duration);
        Ok(())
    }

    /// Record a failure without freeing the agent (it is still executing).
    pub fn record_failure(&mut self, agent_id: &str) -> TaskforgeResult<()> {
        self.get_mut(agent_id)?.performance.record_failure();
        Ok(())
    }

    /// Return an agent to idle without touching its metrics.
    pub fn release(&mut self, agent_id: &str) -> TaskforgeResult<()> {
        Self::make_idle(self.get_mut(agent_id)?);
        Ok(())
    }

    pub fn set_status(&mut self, agent_id: &str, status: AgentStatus) -> TaskforgeResult<()> {
        let agent = self.get_mut(agent_id)?;
        if agent.status != status {
            info!(agent_id, from = ?agent.status, to = ?status, "AgentRegistry: status changed");
            agent.status = status;
        }
        if status != AgentStatus::Working {
            agent.current_task = None;
        }
        Ok(())
    }

    pub fn summary(&self) -> RegistrySummary {
        let count = |status: AgentStatus| self.agents.iter().filter(|a| a.status == status).count();
        RegistrySummary {
            total: self.agents.len(),
            idle: count(AgentStatus::Idle),
            working: count(AgentStatus::Working),
            error: count(AgentStatus::Error),
        }
    }

    /// Serialize the roster and summary as JSON (for dashboards).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "agents": self.agents,
            "summary": self.summary(),
        })
    }

    fn get_mut(&mut self, agent_id: &str) -> TaskforgeResult<&mut Agent> {
        self.agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| TaskforgeError::AgentNotFound(agent_id.to_string()))
    }

    fn make_idle(agent: &mut Agent) {
        agent.status = AgentStatus::Idle;
        agent.current_task = None;
    }
}
