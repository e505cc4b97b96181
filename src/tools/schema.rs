//! 工具调用格式的 JSON Schema（schemars 自动生成）
//!
//! 拼入 system prompt，约束推理端按 `{"tool": "...", "args": {...}}` 回复工具请求。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::{Map, Value};

/// 推理端回复中的工具请求
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ToolCallFormat {
    /// 工具名，如 update_context、read_context、echo
    pub tool: String,
    /// 工具参数，结构由各工具的 parameters schema 决定
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// 返回工具调用的 JSON Schema 字符串
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
