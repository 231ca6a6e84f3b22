use crate::rules::{default_rules, fill_template, DecompositionRule, FixedTaskTemplate, Vocabulary};
use crate::types::{Complexity, Priority, Task, TaskPlan};
use crate::validation::{self, ValidationReport};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use taskforge_core::{TaskforgeError, TaskforgeResult};
use tracing::{debug, warn};

/// Optional hints supplied alongside a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecompositionContext {
    /// Overrides the estimated complexity.
    #[serde(default)]
    pub complexity: Option<Complexity>,
    /// Overrides the extracted domain.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl DecompositionContext {
    pub fn with_constraints<I, S>(constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            constraints: constraints.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// A sub-topic extracted from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    /// The matched phrase including its action verb; used for rule matching.
    pub phrase: String,
    /// The phrase with the verb stripped; used to fill templates.
    pub subject: String,
}

/// Summary figures over a decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionStats {
    pub total_tasks: usize,
    /// Minutes.
    pub total_estimated_duration: u64,
    pub priority_distribution: BTreeMap<String, usize>,
    pub agent_distribution: BTreeMap<String, usize>,
}

/// Turns a free-text request into a set of dependent tasks using keyword rules.
pub struct TaskDecomposer {
    rules: Vec<DecompositionRule>,
    vocabulary: Vocabulary,
    action_pattern: Option<Regex>,
    multi_step: Vec<Regex>,
}

impl TaskDecomposer {
    /// Decomposer with the built-in rules and vocabulary.
    pub fn new() -> Self {
        Self::with_rules(default_rules(), Vocabulary::default())
    }

    /// Patterns that fail to compile are dropped with a warning; use
    /// [`TaskDecomposer::check_vocabulary`] to reject them up front.
    pub fn with_rules(rules: Vec<DecompositionRule>, vocabulary: Vocabulary) -> Self {
        let action_pattern = match action_regex(&vocabulary) {
            Ok(re) => re,
            Err(e) => {
                warn!(error = %e, "Decomposer: invalid action verb pattern, components disabled");
                None
            }
        };
        let multi_step = vocabulary
            .multi_step_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Decomposer: skipping invalid multi-step pattern");
                    None
                }
            })
            .collect();

        Self {
            rules,
            vocabulary,
            action_pattern,
            multi_step,
        }
    }

    /// Strict compile check of every pattern in a vocabulary.
    pub fn check_vocabulary(vocabulary: &Vocabulary) -> TaskforgeResult<()> {
        action_regex(vocabulary)?;
        for pattern in &vocabulary.multi_step_patterns {
            Regex::new(pattern).map_err(|e| {
                TaskforgeError::Config(format!("Invalid multi-step pattern '{pattern}': {e}"))
            })?;
        }
        Ok(())
    }

    pub fn rules(&self) -> &[DecompositionRule] {
        &self.rules
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Decomposes a request into tasks. Never fails; the worst case is a
    /// single generic task.
    pub fn decompose(&self, request: &str, context: &DecompositionContext) -> Vec<Task> {
        let complexity = context
            .complexity
            .unwrap_or_else(|| self.assess_complexity(request));
        let domain = context
            .domain
            .clone()
            .unwrap_or_else(|| self.extract_domain(request));
        let components = self.extract_components(request);

        debug!(
            ?complexity,
            domain = %domain,
            components = components.len(),
            "Decomposer: analysed request"
        );

        let mut tasks = match complexity {
            Complexity::Simple => self.simple_tasks(&components, &domain, request),
            Complexity::Medium => self.medium_tasks(&components, &domain, request),
            Complexity::Complex => self.complex_tasks(&components, &domain, request),
        };

        if tasks.is_empty() {
            tasks.push(self.generic_task(request, &domain));
        }

        self.wire_dependencies(&mut tasks);
        self.adjust_priorities(&mut tasks, &context.constraints);
        tasks
    }

    /// Decomposes a request and wraps the tasks in a titled plan.
    pub fn decompose_plan(&self, request: &str, context: &DecompositionContext) -> TaskPlan {
        let tasks = self.decompose(request, context);
        TaskPlan::new(
            request,
            self.plan_title(request),
            self.vocabulary.plan_description.replace("{request}", request),
            tasks,
        )
    }

    pub fn validate(&self, tasks: &[Task]) -> ValidationReport {
        validation::validate(tasks)
    }

    pub fn stats(&self, tasks: &[Task]) -> DecompositionStats {
        let mut priority_distribution = BTreeMap::new();
        let mut agent_distribution = BTreeMap::new();
        for task in tasks {
            *priority_distribution
                .entry(task.priority.to_string())
                .or_insert(0) += 1;
            if let Some(agent) = &task.assigned_agent {
                *agent_distribution.entry(agent.clone()).or_insert(0) += 1;
            }
        }
        DecompositionStats {
            total_tasks: tasks.len(),
            total_estimated_duration: tasks
                .iter()
                .map(|t| u64::from(t.estimated_duration.unwrap_or(0)))
                .sum(),
            priority_distribution,
            agent_distribution,
        }
    }

    /// Weighted keyword score mapped onto three tiers.
    pub fn assess_complexity(&self, request: &str) -> Complexity {
        let lower = request.to_lowercase();
        let hits = |indicators: &[String]| -> u32 {
            indicators
                .iter()
                .filter(|i| lower.contains(&i.to_lowercase()))
                .count() as u32
        };

        let v = &self.vocabulary;
        let mut score = hits(&v.simple_indicators)
            + hits(&v.medium_indicators) * 2
            + hits(&v.complex_indicators) * 3;
        if self.multi_step.iter().any(|re| re.is_match(request)) {
            score += v.multi_step_bonus;
        }

        if score <= v.simple_threshold {
            Complexity::Simple
        } else if score <= v.medium_threshold {
            Complexity::Medium
        } else {
            Complexity::Complex
        }
    }

    pub fn extract_domain(&self, request: &str) -> String {
        let lower = request.to_lowercase();
        self.vocabulary
            .domain_keywords
            .iter()
            .find(|k| lower.contains(&k.to_lowercase()))
            .cloned()
            .unwrap_or_else(|| self.vocabulary.default_domain.clone())
    }

    /// Pattern extraction around action verbs, falling back to the whole request.
    pub fn extract_components(&self, request: &str) -> Vec<Component> {
        let mut components = Vec::new();
        if let Some(re) = &self.action_pattern {
            for caps in re.captures_iter(request) {
                let subject = caps.get(2).map_or("", |m| m.as_str()).trim();
                let phrase = caps.get(0).map_or("", |m| m.as_str()).trim();
                if !subject.is_empty() {
                    components.push(Component {
                        phrase: phrase.to_string(),
                        subject: subject.to_string(),
                    });
                }
            }
        }

        if components.is_empty() {
            components.push(Component {
                phrase: request.trim().to_string(),
                subject: request.trim().to_string(),
            });
        }
        components
    }

    fn plan_title(&self, request: &str) -> String {
        self.vocabulary
            .plan_titles
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| request.contains(k.as_str())))
            .map(|rule| rule.title.clone())
            .unwrap_or_else(|| self.vocabulary.default_plan_title.clone())
    }

    /// One task per component; first matching rule wins.
    fn simple_tasks(&self, components: &[Component], domain: &str, request: &str) -> Vec<Task> {
        components
            .iter()
            .map(|c| match self.rules.iter().find(|r| r.matches(&c.phrase)) {
                Some(rule) => task_from_rule(rule, &c.subject, domain),
                None => self.generic_task_for(&c.subject, domain, request),
            })
            .collect()
    }

    /// Every matching rule of a component yields its own task.
    fn medium_tasks(&self, components: &[Component], domain: &str, request: &str) -> Vec<Task> {
        let mut tasks = Vec::new();
        for component in components {
            let before = tasks.len();
            tasks.extend(
                self.rules
                    .iter()
                    .filter(|r| r.matches(&component.phrase))
                    .map(|r| task_from_rule(r, &component.subject, domain)),
            );
            if tasks.len() == before {
                tasks.push(self.generic_task_for(&component.subject, domain, request));
            }
        }
        tasks
    }

    /// Planning task, a fixed stage chain per component, and a summary task
    /// depending on everything before it.
    fn complex_tasks(&self, components: &[Component], domain: &str, request: &str) -> Vec<Task> {
        let mut tasks = vec![fixed_task(&self.vocabulary.planning_task, request)];

        for component in components {
            for stage in &self.vocabulary.chain_stages {
                if let Some(rule) = self.rules.iter().find(|r| &r.task_type == stage) {
                    tasks.push(task_from_rule(rule, &component.subject, domain));
                }
            }
        }

        let others: Vec<_> = tasks.iter().map(|t| t.id).collect();
        tasks.push(fixed_task(&self.vocabulary.summary_task, request).with_dependencies(others));
        tasks
    }

    fn generic_task_for(&self, subject: &str, domain: &str, request: &str) -> Task {
        match self.rules.first() {
            Some(rule) => task_from_rule(rule, subject, domain),
            None => Task::new(subject, request),
        }
    }

    fn generic_task(&self, request: &str, domain: &str) -> Task {
        self.generic_task_for(request.trim(), domain, request)
    }

    /// Keyword-based wiring: design → analysis, development → design,
    /// testing and documentation → development. The first other task whose
    /// title carries the wanted marker wins.
    fn wire_dependencies(&self, tasks: &mut [Task]) {
        let m = &self.vocabulary.markers;
        for i in 0..tasks.len() {
            let title = &tasks[i].title;
            let wanted = if contains_any(title, &m.design) {
                &m.analysis
            } else if contains_any(title, &m.development) {
                &m.design
            } else if contains_any(title, &m.testing) || contains_any(title, &m.documentation) {
                &m.development
            } else {
                continue;
            };

            let dep = tasks
                .iter()
                .enumerate()
                .find(|(j, t)| *j != i && contains_any(&t.title, wanted))
                .map(|(_, t)| t.id);
            if let Some(dep) = dep {
                tasks[i].add_dependency(dep);
            }
        }
    }

    fn adjust_priorities(&self, tasks: &mut [Task], constraints: &[String]) {
        let m = &self.vocabulary.markers;
        if constraints.iter().any(|c| contains_any(c, &m.urgency)) {
            for task in tasks.iter_mut() {
                task.priority = task.priority.escalate();
            }
        }

        for task in tasks.iter_mut() {
            if contains_any(&task.title, &m.critical) {
                task.priority = Priority::Critical;
            } else if contains_any(&task.title, &m.high) {
                task.priority = Priority::High;
            }
        }
    }
}

impl Default for TaskDecomposer {
    fn default() -> Self {
        Self::new()
    }
}

fn action_regex(vocabulary: &Vocabulary) -> TaskforgeResult<Option<Regex>> {
    if vocabulary.action_verbs.is_empty() {
        return Ok(None);
    }
    let verbs: Vec<String> = vocabulary
        .action_verbs
        .iter()
        .map(|v| regex::escape(v))
        .collect();
    let terminators = regex::escape(&vocabulary.component_terminators);
    let pattern = format!(r"({})\s*([^{}]+)", verbs.join("|"), terminators);
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| TaskforgeError::Config(format!("Invalid action verb pattern: {e}")))
}

fn task_from_rule(rule: &DecompositionRule, subject: &str, domain: &str) -> Task {
    let template = &rule.template;
    let mut task = Task::new(
        fill_template(&template.title, subject, domain),
        fill_template(&template.description, subject, domain),
    )
    .with_priority(template.priority)
    .with_estimated_duration(template.estimated_duration)
    .with_task_type(rule.task_type.clone());
    task.assigned_agent = rule.required_agents.first().cloned();
    task
}

fn fixed_task(template: &FixedTaskTemplate, request: &str) -> Task {
    Task::new(
        template.title.clone(),
        template.description.replace("{request}", request),
    )
    .with_priority(template.priority)
    .with_estimated_duration(template.estimated_duration)
    .with_assigned_agent(template.agent.clone())
}

fn contains_any(text: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| text.contains(m.as_str()))
}
