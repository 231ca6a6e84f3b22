use crate::types::Priority;
use serde::{Deserialize, Serialize};
use taskforge_core::AgentId;

/// Title/description template of a rule plus its defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTemplate {
    /// May contain `{feature}`, `{component}`, `{system}`, `{aspect}` (all
    /// filled with the component subject) and `{domain}`.
    pub title: String,
    pub description: String,
    pub priority: Priority,
    /// Minutes.
    pub estimated_duration: u32,
}

/// Static mapping from trigger keywords to a task shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionRule {
    pub keywords: Vec<String>,
    pub task_type: String,
    pub template: RuleTemplate,
    /// Agent ids able to execute the task; the first one becomes the task's
    /// `assigned_agent` hint.
    pub required_agents: Vec<AgentId>,
}

impl DecompositionRule {
    /// Case-insensitive keyword hit anywhere in `text`.
    pub fn matches(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .any(|k| lower.contains(&k.to_lowercase()))
    }
}

/// Substitutes every placeholder of a rule template.
pub fn fill_template(template: &str, subject: &str, domain: &str) -> String {
    template
        .replace("{feature}", subject)
        .replace("{component}", subject)
        .replace("{system}", subject)
        .replace("{aspect}", subject)
        .replace("{domain}", domain)
}

/// A fixed task (planning, summary) added around complex decompositions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedTaskTemplate {
    pub title: String,
    /// `{request}` is replaced with the original request.
    pub description: String,
    pub priority: Priority,
    pub estimated_duration: u32,
    pub agent: AgentId,
}

/// Title markers used by the dependency-wiring and priority passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageMarkers {
    pub analysis: Vec<String>,
    pub design: Vec<String>,
    /// Development or implementation.
    pub development: Vec<String>,
    pub testing: Vec<String>,
    pub documentation: Vec<String>,
    /// Titles forced to `critical`.
    pub critical: Vec<String>,
    /// Titles forced to `high`.
    pub high: Vec<String>,
    /// Constraint strings that escalate every task one level.
    pub urgency: Vec<String>,
}

impl Default for StageMarkers {
    fn default() -> Self {
        Self {
            analysis: strings(&["分析"]),
            design: strings(&["设计"]),
            development: strings(&["开发", "实现"]),
            testing: strings(&["测试"]),
            documentation: strings(&["文档"]),
            critical: strings(&["规划", "分析"]),
            high: strings(&["部署", "上线"]),
            urgency: strings(&["紧急", "优先"]),
        }
    }
}

/// Plan title chosen when the request contains any of `keywords`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTitleRule {
    pub keywords: Vec<String>,
    pub title: String,
}

/// All language-dependent heuristics of the decomposer.
///
/// The defaults are the built-in Chinese keyword tables; every field can be
/// overridden from the `[vocabulary]` config table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Complexity indicators scoring 1, 2 and 3 points per hit.
    pub simple_indicators: Vec<String>,
    pub medium_indicators: Vec<String>,
    pub complex_indicators: Vec<String>,
    /// Regex patterns that signal a multi-step request.
    pub multi_step_patterns: Vec<String>,
    pub multi_step_bonus: u32,
    /// Highest score still considered simple / medium.
    pub simple_threshold: u32,
    pub medium_threshold: u32,
    /// Verbs that introduce a component in the request text.
    pub action_verbs: Vec<String>,
    /// Characters that end a component.
    pub component_terminators: String,
    pub domain_keywords: Vec<String>,
    pub default_domain: String,
    /// Task types of the fixed chain built per component for complex requests.
    pub chain_stages: Vec<String>,
    pub planning_task: FixedTaskTemplate,
    pub summary_task: FixedTaskTemplate,
    pub markers: StageMarkers,
    pub plan_titles: Vec<PlanTitleRule>,
    pub default_plan_title: String,
    /// `{request}` is replaced with the original request.
    pub plan_description: String,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            simple_indicators: strings(&["添加", "修改", "删除", "更新", "简单"]),
            medium_indicators: strings(&["开发", "实现", "设计", "测试", "集成"]),
            complex_indicators: strings(&["系统", "平台", "架构", "重构", "迁移", "优化"]),
            multi_step_patterns: strings(&[r"\d+个?任务", "多步", "分阶段"]),
            multi_step_bonus: 3,
            simple_threshold: 2,
            medium_threshold: 6,
            action_verbs: strings(&["开发", "实现", "设计", "测试", "优化", "集成"]),
            component_terminators: "，。！？".to_string(),
            domain_keywords: strings(&[
                "网站", "应用", "系统", "平台", "软件", "程序", "服务", "API", "数据库", "前端",
                "后端", "移动端", "桌面端",
            ]),
            default_domain: "通用".to_string(),
            chain_stages: strings(&[
                "analysis",
                "design",
                "development",
                "testing",
                "documentation",
            ]),
            planning_task: FixedTaskTemplate {
                title: "项目规划".to_string(),
                description: "对\"{request}\"进行项目规划和需求分析".to_string(),
                priority: Priority::Critical,
                estimated_duration: 60,
                agent: "product-manager".to_string(),
            },
            summary_task: FixedTaskTemplate {
                title: "项目总结".to_string(),
                description: "总结项目执行结果，编写最终报告".to_string(),
                priority: Priority::Medium,
                estimated_duration: 30,
                agent: "product-manager".to_string(),
            },
            markers: StageMarkers::default(),
            plan_titles: vec![
                PlanTitleRule {
                    keywords: strings(&["开发", "实现"]),
                    title: "软件开发项目".to_string(),
                },
                PlanTitleRule {
                    keywords: strings(&["分析", "研究"]),
                    title: "分析研究项目".to_string(),
                },
                PlanTitleRule {
                    keywords: strings(&["设计"]),
                    title: "设计项目".to_string(),
                },
            ],
            default_plan_title: "综合项目".to_string(),
            plan_description: "基于用户需求\"{request}\"生成的任务执行计划".to_string(),
        }
    }
}

/// The built-in rule set. The first rule doubles as the generic fallback.
pub fn default_rules() -> Vec<DecompositionRule> {
    vec![
        rule(
            &["开发", "实现", "编写", "编程", "构建"],
            "development",
            ("开发{feature}", "实现{feature}功能，包括核心逻辑和界面开发"),
            Priority::High,
            120,
            &["developer"],
        ),
        rule(
            &["设计", "架构", "规划", "原型"],
            "design",
            ("设计{component}", "设计{component}的架构和用户界面"),
            Priority::High,
            90,
            &["architect"],
        ),
        rule(
            &["测试", "验证", "检查", "质量"],
            "testing",
            ("测试{feature}", "对{feature}进行全面的功能和性能测试"),
            Priority::Medium,
            60,
            &["tester"],
        ),
        rule(
            &["文档", "说明", "手册", "指南"],
            "documentation",
            ("编写{feature}文档", "为{feature}编写用户手册和技术文档"),
            Priority::Medium,
            45,
            &["document-writer"],
        ),
        rule(
            &["分析", "研究", "调研", "需求"],
            "analysis",
            ("分析{domain}", "分析{domain}的需求和可行性"),
            Priority::High,
            75,
            &["product-manager"],
        ),
        rule(
            &["部署", "发布", "上线", "运维"],
            "deployment",
            ("部署{system}", "将{system}部署到生产环境"),
            Priority::Critical,
            30,
            &["developer"],
        ),
        rule(
            &["优化", "改进", "提升", "性能"],
            "optimization",
            ("优化{aspect}", "优化{aspect}的性能和用户体验"),
            Priority::Medium,
            90,
            &["developer", "tester"],
        ),
        rule(
            &["集成", "对接", "连接", "接口"],
            "integration",
            ("集成{system}", "将{system}与现有系统进行集成"),
            Priority::High,
            100,
            &["developer", "architect"],
        ),
    ]
}

fn rule(
    keywords: &[&str],
    task_type: &str,
    (title, description): (&str, &str),
    priority: Priority,
    estimated_duration: u32,
    required_agents: &[&str],
) -> DecompositionRule {
    DecompositionRule {
        keywords: strings(keywords),
        task_type: task_type.to_string(),
        template: RuleTemplate {
            title: title.to_string(),
            description: description.to_string(),
            priority,
            estimated_duration,
        },
        required_agents: strings(required_agents),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
