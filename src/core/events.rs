//! 会话过程事件：推送给控制台或其他观察者

use serde::Serialize;

use crate::core::TerminationReason;
use crate::memory::{Message, ToolInvocation, ToolOutcome};

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// 新回合开始
    TurnStarted { round: usize, actor: String },
    /// 会话记录追加了一条消息
    Message { message: Message },
    /// Actor 请求调用工具
    ToolCall {
        actor: String,
        invocation: ToolInvocation,
    },
    /// 等待操作员确认
    ConfirmationRequested {
        actor: String,
        tool: String,
        invocation_id: String,
    },
    /// 工具返回
    ToolOutcome { actor: String, outcome: ToolOutcome },
    /// 会话结束
    Terminated {
        reason: TerminationReason,
        rounds: usize,
    },
}
