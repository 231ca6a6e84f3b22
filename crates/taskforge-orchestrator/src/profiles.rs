use crate::types::Agent;

/// The built-in roster, in registration order.
pub fn default_agents() -> Vec<Agent> {
    vec![
        product_manager(),
        architect(),
        developer(),
        tester(),
        document_writer(),
    ]
}

fn product_manager() -> Agent {
    Agent::new("product-manager", "产品经理", "Product Manager")
        .with_description("负责需求分析、产品规划和任务分解")
        .with_capabilities(["需求分析", "任务分解", "优先级排序", "用户故事编写"])
}

fn architect() -> Agent {
    Agent::new("architect", "架构师", "Architect")
        .with_description("负责系统设计、技术选型和架构规划")
        .with_capabilities(["系统设计", "技术选型", "架构规划", "性能优化"])
}

fn developer() -> Agent {
    Agent::new("developer", "开发工程师", "Developer")
        .with_description("负责代码实现、单元测试和代码审查")
        .with_capabilities(["代码实现", "单元测试", "代码审查", "调试"])
}

fn tester() -> Agent {
    Agent::new("tester", "测试工程师", "QA Engineer")
        .with_description("负责测试计划制定、测试执行和质量保证")
        .with_capabilities(["测试计划", "测试执行", "缺陷报告", "质量保证"])
}

fn document_writer() -> Agent {
    Agent::new("document-writer", "文档工程师", "Technical Writer")
        .with_description("负责文档编写、用户手册和技术文档")
        .with_capabilities(["文档编写", "用户手册", "技术文档", "API文档"])
}
