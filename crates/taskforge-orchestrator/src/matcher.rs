use crate::types::{Agent, Task};
use std::collections::HashMap;

/// Decides whether an agent can take a task.
///
/// Selection among accepted agents is done by the registry (first idle agent
/// in registration order), so implementations only answer yes or no.
pub trait Matcher: Send + Sync {
    fn is_suitable(&self, agent: &Agent, task: &Task) -> bool;
}

/// Keyword matcher over capabilities, role keywords and the task's agent hint.
///
/// An agent is accepted when any of these holds:
/// - one of its capabilities appears (case-insensitively) in the task title or description
/// - its role maps to a keyword that appears in the task title
/// - the task's `assigned_agent` hint names the agent
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    role_keywords: HashMap<String, Vec<String>>,
}

impl KeywordMatcher {
    /// Matcher with the built-in role table.
    pub fn new() -> Self {
        Self::with_role_keywords(default_role_keywords())
    }

    pub fn with_role_keywords(role_keywords: HashMap<String, Vec<String>>) -> Self {
        Self { role_keywords }
    }

    fn matches_capability(agent: &Agent, title: &str, description: &str) -> bool {
        agent.capabilities.iter().any(|capability| {
            let capability = capability.to_lowercase();
            !capability.is_empty() && (title.contains(&capability) || description.contains(&capability))
        })
    }

    fn matches_role(&self, role: &str, title: &str) -> bool {
        self.role_keywords
            .get(role)
            .is_some_and(|keywords| keywords.iter().any(|k| title.contains(&k.to_lowercase())))
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher for KeywordMatcher {
    fn is_suitable(&self, agent: &Agent, task: &Task) -> bool {
        let title = task.title.to_lowercase();
        let description = task.description.to_lowercase();

        Self::matches_capability(agent, &title, &description)
            || self.matches_role(&agent.role, &title)
            || task.assigned_agent.as_deref() == Some(agent.id.as_str())
    }
}

/// Role → title keywords of the built-in roster.
pub fn default_role_keywords() -> HashMap<String, Vec<String>> {
    [
        ("Product Manager", &["需求", "规划", "分析", "设计", "用户"][..]),
        ("Architect", &["架构", "设计", "系统", "技术", "性能"][..]),
        ("Developer", &["开发", "实现", "代码", "编程", "测试"][..]),
        ("QA Engineer", &["测试", "质量", "验证", "缺陷", "检查"][..]),
        ("Technical Writer", &["文档", "手册", "说明", "API", "用户"][..]),
    ]
    .into_iter()
    .map(|(role, keywords)| {
        (
            role.to_string(),
            keywords.iter().map(|k| (*k).to_string()).collect(),
        )
    })
    .collect()
}
