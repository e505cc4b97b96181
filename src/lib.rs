//! Agency - 多角色轮转对话与工具分发引擎
//!
//! 模块划分：
//! - **actor**: 参与者、Decider 抽象、轮次选择器、LLM / 脚本化 Decider
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **console**: 控制台上的人工输入与操作员确认
//! - **core**: 编排循环、会话状态机、确认通道、会话监管、错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话记录、共享项目上下文、原子写与会话导出
//! - **observability**: tracing 初始化
//! - **tools**: 工具注册表、分发边界与内置工具

pub mod actor;
pub mod config;
pub mod console;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;

pub use crate::actor::{Action, Actor, Decider, Role};
pub use crate::core::{Orchestrator, SessionBuilder, SessionSummary, TerminationReason};
