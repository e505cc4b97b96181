//! Actor：角色绑定的参与者
//!
//! Actor 只是不可变的数据（名称、角色、能力集合、是否需人工确认）；决策逻辑由外部的 Decider 提供，
//! 引擎把它当作黑盒：给定会话记录，返回一条文本或一次工具调用。

pub mod llm_actor;
pub mod scripted;
pub mod selector;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::AgencyError;
use crate::memory::{Message, ToolInvocation};

pub use llm_actor::{parse_action, LlmDecider};
pub use scripted::ScriptedDecider;
pub use selector::{Selection, TurnSelector};

/// 参与者角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 面向人类的管理员
    Admin,
    /// 拆解任务、维护项目上下文
    Planner,
    /// 编写代码、执行命令
    Executor,
    /// 运行测试、验收结果
    Verifier,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Planner, Role::Executor, Role::Verifier];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Planner => "planner",
            Role::Executor => "executor",
            Role::Verifier => "verifier",
        };
        f.write_str(s)
    }
}

/// 会话参与者（会话期间不可变）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub name: String,
    pub role: Role,
    /// 可调用的工具名
    pub capabilities: BTreeSet<String>,
    /// 调用工具前是否需要操作员确认
    pub requires_human_confirmation: bool,
}

impl Actor {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            capabilities: BTreeSet::new(),
            requires_human_confirmation: false,
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn with_confirmation(mut self, required: bool) -> Self {
        self.requires_human_confirmation = required;
        self
    }

    pub fn can_use(&self, tool: &str) -> bool {
        self.capabilities.contains(tool)
    }
}

/// Actor 在一个回合内的动作
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// 自然语言消息
    Text(String),
    /// 请求调用工具
    ToolRequest(ToolInvocation),
}

impl Action {
    pub fn text(s: impl Into<String>) -> Self {
        Action::Text(s.into())
    }
}

/// 外部推理协作者：根据会话记录与可用工具决定下一个动作
#[async_trait]
pub trait Decider: Send + Sync {
    async fn decide(
        &self,
        transcript: &[Message],
        capabilities: &BTreeSet<String>,
    ) -> Result<Action, AgencyError>;
}
