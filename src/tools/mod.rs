//! 工具层：注册表、分发边界与内置工具

pub mod context_tools;
pub mod dispatch;
pub mod echo;
pub mod registry;
pub mod schema;

pub use context_tools::{ReadContextTool, UpdateContextTool, READ_CONTEXT, UPDATE_CONTEXT};
pub use dispatch::{DispatchError, ToolDispatcher};
pub use echo::EchoTool;
pub use registry::{DynTool, Tool, ToolContext, ToolEntry, ToolError, ToolRegistry};
pub use schema::tool_call_schema_json;

use crate::actor::Role;

/// 内置工具：update_context（Admin、Planner）、read_context 与 echo（所有角色）
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(UpdateContextTool, [Role::Admin, Role::Planner]);
    registry.register(ReadContextTool, Role::ALL);
    registry.register(EchoTool, Role::ALL);
    registry
}
