//! 编排循环状态机与会话结果
//!
//! Running → AwaitingTool → (AwaitingConfirmation →) Running … → Terminated(reason)；Terminated 为吸收态。

use std::fmt;

use serde::Serialize;

use crate::memory::Message;

/// 会话终止原因
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum TerminationReason {
    /// 最近一条文本消息包含终止标记
    ExplicitTerminationToken,
    /// round_count 达到 max_rounds
    MaxRoundsReached,
    /// 操作员取消
    OperatorCancelled,
    /// 上下文或会话记录无法持久化（致命）
    StorageFailure(String),
}

impl TerminationReason {
    /// 是否为失败终止
    pub fn is_failure(&self) -> bool {
        matches!(self, TerminationReason::StorageFailure(_))
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::ExplicitTerminationToken => write!(f, "explicit-termination-token"),
            TerminationReason::MaxRoundsReached => write!(f, "max-rounds-reached"),
            TerminationReason::OperatorCancelled => write!(f, "operator-cancelled"),
            TerminationReason::StorageFailure(_) => write!(f, "storage-failure"),
        }
    }
}

/// 编排循环状态
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Running,
    AwaitingTool,
    AwaitingConfirmation,
    Terminated(TerminationReason),
}

impl LoopState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, LoopState::Terminated(_))
    }
}

/// 会话结束后的导出物：完整记录 + 一行结论
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub reason: TerminationReason,
    /// 合成的一行结论
    pub outcome: String,
    pub round_count: usize,
    pub started_at: String,
    pub finished_at: String,
    /// 致命原因（仅失败终止时存在）
    pub fatal: Option<String>,
    pub transcript: Vec<Message>,
}
