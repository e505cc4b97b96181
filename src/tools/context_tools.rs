//! 项目上下文工具：update_context / read_context
//!
//! update_context 是修改共享上下文的唯一入口；参数本身就是要合并的键值。
//! 没有任何键时视为无操作成功，不写盘。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::memory::ContextPatch;
use crate::tools::{Tool, ToolContext, ToolError};

pub const UPDATE_CONTEXT: &str = "update_context";
pub const READ_CONTEXT: &str = "read_context";

/// 更新项目上下文（浅合并）
pub struct UpdateContextTool;

#[async_trait]
impl Tool for UpdateContextTool {
    type Args = ContextPatch;

    fn name(&self) -> &str {
        UPDATE_CONTEXT
    }

    fn description(&self) -> &str {
        "Update project context with new information. Provided top-level keys (name, description, \
         tech_stack, features, current_state, or custom keys) replace their previous values; \
         other keys are kept."
    }

    async fn execute(&self, ctx: &ToolContext, args: ContextPatch) -> Result<String, ToolError> {
        let mut store = ctx.context.lock().await;
        if store.update(args).await? {
            Ok("Project context updated successfully".to_string())
        } else {
            Ok("No updates provided, project context remains unchanged".to_string())
        }
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ReadContextArgs {}

/// 读取当前项目上下文
pub struct ReadContextTool;

#[async_trait]
impl Tool for ReadContextTool {
    type Args = ReadContextArgs;

    fn name(&self) -> &str {
        READ_CONTEXT
    }

    fn description(&self) -> &str {
        "Read the current project context as JSON. Args: {}"
    }

    async fn execute(&self, ctx: &ToolContext, _args: ReadContextArgs) -> Result<String, ToolError> {
        let store = ctx.context.lock().await;
        serde_json::to_string_pretty(store.get())
            .map_err(|e| ToolError::Failed(format!("Error: cannot render project context: {}", e)))
    }
}
