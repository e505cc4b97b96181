//! 工具注册表
//!
//! 每个工具实现 Tool trait（name / description / 类型化 Args / execute），启动时显式注册一次，
//! 同时声明允许调用它的角色。参数在分发边界先按 Args 反序列化校验，失败即拒绝，处理器不会被调用。

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::actor::Role;
use crate::core::StorageError;
use crate::memory::ContextHandle;

/// 工具处理器返回的错误
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),

    /// 共享上下文写盘失败（致命）
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// 每个会话独立的工具执行环境：工作目录与上下文存储都显式传入，工具不读进程级全局状态
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub session_id: String,
    pub workspace: PathBuf,
    pub context: ContextHandle,
}

/// 工具 trait：名称、描述（供 LLM 理解）、类型化参数、异步执行
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    /// 参数类型；其 JSON Schema 会导出给推理端
    type Args: DeserializeOwned + JsonSchema + Send + 'static;

    /// 工具名称（ToolInvocation.tool_name）
    fn name(&self) -> &str;

    /// 工具描述
    fn description(&self) -> &str;

    async fn execute(&self, ctx: &ToolContext, args: Self::Args) -> Result<String, ToolError>;
}

/// 按 Args 类型解析参数
pub fn parse_args<A: DeserializeOwned>(args: &Map<String, Value>) -> Result<A, ToolError> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// 类型擦除后的工具，注册表按此存储
#[async_trait]
pub trait DynTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    /// 只校验不执行
    fn validate(&self, args: &Map<String, Value>) -> Result<(), ToolError>;
    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<String, ToolError>;
}

#[async_trait]
impl<T: Tool> DynTool for T {
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn description(&self) -> &str {
        Tool::description(self)
    }

    fn parameters_schema(&self) -> Value {
        let schema = schemars::schema_for!(<T as Tool>::Args);
        serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    fn validate(&self, args: &Map<String, Value>) -> Result<(), ToolError> {
        parse_args::<T::Args>(args).map(|_| ())
    }

    async fn call(&self, ctx: &ToolContext, args: &Map<String, Value>) -> Result<String, ToolError> {
        let parsed = parse_args::<T::Args>(args)?;
        Tool::execute(self, ctx, parsed).await
    }
}

/// 注册项：处理器 + 允许调用的角色
#[derive(Clone)]
pub struct ToolEntry {
    pub tool: Arc<dyn DynTool>,
    pub roles: BTreeSet<Role>,
}

impl ToolEntry {
    pub fn permits(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// 工具注册表：按名称存储，会话之间可通过 Arc 共享（处理器本身不持有会话状态）
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool>(&mut self, tool: T, roles: impl IntoIterator<Item = Role>) {
        let name = Tool::name(&tool).to_string();
        let entry = ToolEntry {
            tool: Arc::new(tool),
            roles: roles.into_iter().collect(),
        };
        if self.tools.insert(name.clone(), entry).is_some() {
            tracing::warn!(tool = %name, "tool registered twice, previous entry replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 按名称排序
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 某角色可用的全部工具（角色未配置能力时的默认能力集）
    pub fn tools_for_role(&self, role: Role) -> BTreeSet<String> {
        self.tools
            .iter()
            .filter(|(_, e)| e.permits(role))
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的 Available tools 段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.tool_names()
            .into_iter()
            .filter_map(|n| {
                self.tools
                    .get(&n)
                    .map(|e| (n.clone(), e.tool.description().to_string()))
            })
            .collect()
    }

    /// 仅包含 names 中工具的 schema JSON（供某个 Actor 的 prompt 使用）
    pub fn to_schema_json(&self, names: &BTreeSet<String>) -> String {
        let tools: Vec<Value> = names
            .iter()
            .filter_map(|n| self.tools.get(n).map(|e| (n, e)))
            .map(|(name, e)| {
                serde_json::json!({
                    "name": name,
                    "description": e.tool.description(),
                    "parameters": e.tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}
