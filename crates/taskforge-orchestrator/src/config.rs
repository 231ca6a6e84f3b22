use crate::rules::{DecompositionRule, Vocabulary};
use crate::types::Agent;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use taskforge_core::{TaskforgeError, TaskforgeResult};

/// Scheduler limits and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of pending entries.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before a failed entry becomes runnable again.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Priority ordering when true, FIFO otherwise.
    #[serde(default = "default_priority_mode")]
    pub priority_mode: bool,
    /// Execution timeout per attempt.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            priority_mode: default_priority_mode(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl QueueConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Behaviour of the simulated effector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Probability, 0.0 to 1.0, that an attempt fails.
    #[serde(default)]
    pub failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            failure_rate: 0.0,
        }
    }
}

/// Top-level configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    /// Upper bound on simultaneously running tasks.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Buffer size of the event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Initial roster. Empty means the built-in agents.
    #[serde(default)]
    pub agents: Vec<Agent>,
    /// Replacement rule set. Empty means the built-in rules.
    #[serde(default)]
    pub rules: Vec<DecompositionRule>,
    #[serde(default)]
    pub vocabulary: Vocabulary,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            poll_interval_ms: default_poll_interval_ms(),
            event_capacity: default_event_capacity(),
            simulation: SimulationConfig::default(),
            agents: Vec::new(),
            rules: Vec::new(),
            vocabulary: Vocabulary::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Rejects values the scheduler cannot work with.
    pub fn validate(&self) -> TaskforgeResult<()> {
        if self.queue.max_queue_size == 0 {
            return Err(TaskforgeError::Config(
                "queue.max_queue_size must be greater than 0".into(),
            ));
        }
        if self.queue.timeout_ms == 0 {
            return Err(TaskforgeError::Config(
                "queue.timeout_ms must be greater than 0".into(),
            ));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(TaskforgeError::Config(
                "max_concurrent_tasks must be greater than 0".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(TaskforgeError::Config(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(TaskforgeError::Config(
                "event_capacity must be greater than 0".into(),
            ));
        }
        if self.simulation.min_delay_ms > self.simulation.max_delay_ms {
            return Err(TaskforgeError::Config(format!(
                "simulation.min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.simulation.min_delay_ms, self.simulation.max_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.simulation.failure_rate) {
            return Err(TaskforgeError::Config(format!(
                "simulation.failure_rate must be within 0.0..=1.0, got {}",
                self.simulation.failure_rate
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id.as_str()) {
                return Err(TaskforgeError::Config(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
        }
        crate::decomposer::TaskDecomposer::check_vocabulary(&self.vocabulary)
    }
}

/// Reads and validates a TOML configuration file.
pub fn load_config(path: &Path) -> TaskforgeResult<OrchestratorConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: OrchestratorConfig = toml::from_str(&content)
        .map_err(|e| TaskforgeError::Config(format!("{}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

fn default_max_queue_size() -> usize {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    5000
}
fn default_priority_mode() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    300_000
}
fn default_min_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    700
}
fn default_max_concurrent_tasks() -> usize {
    5
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_event_capacity() -> usize {
    256
}
