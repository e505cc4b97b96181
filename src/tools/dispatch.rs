//! 工具分发器
//!
//! 分发边界的固定顺序：调用 id 校验 → 去重 → 查表 → 授权 → 参数校验 → 人工确认 → 执行。
//! 前五步任一失败都不会调用处理器；处理器的任何错误（包括 panic）都在这里被捕获并转成非零 ToolOutcome。
//! 每次分发输出一条 JSON 审计日志。

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::actor::Actor;
use crate::core::session_supervisor::bounded;
use crate::core::{ConfirmationChannel, LoopState, StorageError};
use crate::memory::{ToolInvocation, ToolOutcome};
use crate::tools::{DynTool, ToolContext, ToolError, ToolRegistry};

/// 单次分发失败的原因；Display 即写入 ToolOutcome 的 payload
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("malformed tool request: missing invocation id")]
    MissingInvocationId,

    #[error("duplicate invocation id: {0}")]
    DuplicateInvocation(String),

    #[error("unknown tool")]
    UnknownTool(String),

    #[error("not permitted for this role")]
    NotPermitted { tool: String, actor: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("rejected by operator")]
    Rejected,

    #[error("cancelled by operator")]
    Cancelled,

    #[error("timed out after {secs}s waiting for {what}", secs = .after.as_secs_f64())]
    Timeout { what: &'static str, after: Duration },

    #[error("{0}")]
    HandlerFailure(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl DispatchError {
    /// 只有存储失败会终止会话
    pub fn is_fatal(&self) -> bool {
        matches!(self, DispatchError::Storage(_))
    }

    /// 是否在执行前被拒绝（处理器未被调用）
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DispatchError::MissingInvocationId
                | DispatchError::DuplicateInvocation(_)
                | DispatchError::UnknownTool(_)
                | DispatchError::NotPermitted { .. }
                | DispatchError::InvalidArguments(_)
                | DispatchError::Rejected
        )
    }

    pub fn into_outcome(self, invocation_id: &str) -> ToolOutcome {
        match self {
            DispatchError::Timeout { .. } => ToolOutcome::timeout(invocation_id, self.to_string()),
            other => ToolOutcome::failure(invocation_id, other.to_string()),
        }
    }
}

impl From<ToolError> for DispatchError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::InvalidArguments(msg) => DispatchError::InvalidArguments(msg),
            ToolError::Failed(msg) => DispatchError::HandlerFailure(msg),
            ToolError::Storage(e) => DispatchError::Storage(e),
        }
    }
}

/// 工具分发器：每个会话一个（记录已分发的调用 id），注册表可跨会话共享
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    confirmation: Arc<dyn ConfirmationChannel>,
    tool_timeout: Option<Duration>,
    confirmation_timeout: Option<Duration>,
    dispatched: HashSet<String>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, confirmation: Arc<dyn ConfirmationChannel>) -> Self {
        Self {
            registry,
            confirmation,
            tool_timeout: None,
            confirmation_timeout: None,
            dispatched: HashSet::new(),
        }
    }

    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 简单接口：不可取消，结果直接转为 ToolOutcome
    pub async fn dispatch(
        &mut self,
        actor: &Actor,
        invocation: &ToolInvocation,
        ctx: &ToolContext,
    ) -> ToolOutcome {
        let never = CancellationToken::new();
        match self.dispatch_with(actor, invocation, ctx, &never, |_| {}).await {
            Ok(payload) => ToolOutcome::success(&invocation.id, payload),
            Err(e) => e.into_outcome(&invocation.id),
        }
    }

    /// 完整分发：on_state 在进入 AwaitingConfirmation / AwaitingTool 时被调用，供编排循环驱动状态机
    pub async fn dispatch_with(
        &mut self,
        actor: &Actor,
        invocation: &ToolInvocation,
        ctx: &ToolContext,
        cancel: &CancellationToken,
        mut on_state: impl FnMut(LoopState),
    ) -> Result<String, DispatchError> {
        let start = Instant::now();
        let result = self
            .stages(actor, invocation, ctx, cancel, &mut on_state)
            .await;
        audit(actor, invocation, &result, start.elapsed());
        result
    }

    async fn stages(
        &mut self,
        actor: &Actor,
        invocation: &ToolInvocation,
        ctx: &ToolContext,
        cancel: &CancellationToken,
        on_state: &mut impl FnMut(LoopState),
    ) -> Result<String, DispatchError> {
        let tool = self.admit(actor, invocation)?;
        if actor.requires_human_confirmation {
            on_state(LoopState::AwaitingConfirmation);
            self.confirm(actor, invocation, cancel).await?;
            on_state(LoopState::AwaitingTool);
        }
        self.execute(tool, invocation, ctx).await
    }

    /// 执行前检查；通过后该 id 被标记为已分发
    pub fn admit(
        &mut self,
        actor: &Actor,
        invocation: &ToolInvocation,
    ) -> Result<Arc<dyn DynTool>, DispatchError> {
        if invocation.id.trim().is_empty() {
            return Err(DispatchError::MissingInvocationId);
        }
        if !self.dispatched.insert(invocation.id.clone()) {
            return Err(DispatchError::DuplicateInvocation(invocation.id.clone()));
        }
        let entry = self
            .registry
            .get(&invocation.tool_name)
            .ok_or_else(|| DispatchError::UnknownTool(invocation.tool_name.clone()))?;
        if !actor.can_use(&invocation.tool_name) || !entry.permits(actor.role) {
            return Err(DispatchError::NotPermitted {
                tool: invocation.tool_name.clone(),
                actor: actor.name.clone(),
            });
        }
        entry.tool.validate(&invocation.arguments)?;
        Ok(entry.tool.clone())
    }

    /// 询问操作员；等待期间可被取消，可选超时
    pub async fn confirm(
        &self,
        actor: &Actor,
        invocation: &ToolInvocation,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        tracing::info!(actor = %actor.name, tool = %invocation.tool_name, "awaiting operator confirmation");
        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
            a = bounded(self.confirmation_timeout, self.confirmation.confirm(actor, invocation)) => a,
        };
        match answer {
            Some(true) => Ok(()),
            Some(false) => Err(DispatchError::Rejected),
            None => Err(DispatchError::Timeout {
                what: "operator confirmation",
                after: self.confirmation_timeout.unwrap_or_default(),
            }),
        }
    }

    /// 调用处理器：可选超时，panic 被捕获为 HandlerFailure
    pub async fn execute(
        &self,
        tool: Arc<dyn DynTool>,
        invocation: &ToolInvocation,
        ctx: &ToolContext,
    ) -> Result<String, DispatchError> {
        let call = AssertUnwindSafe(tool.call(ctx, &invocation.arguments)).catch_unwind();
        match bounded(self.tool_timeout, call).await {
            None => Err(DispatchError::Timeout {
                what: "tool handler",
                after: self.tool_timeout.unwrap_or_default(),
            }),
            Some(Err(panic)) => Err(DispatchError::HandlerFailure(format!(
                "Error: tool '{}' crashed: {}",
                invocation.tool_name,
                panic_message(panic.as_ref())
            ))),
            Some(Ok(result)) => result.map_err(DispatchError::from),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn audit(
    actor: &Actor,
    invocation: &ToolInvocation,
    result: &Result<String, DispatchError>,
    elapsed: Duration,
) {
    let outcome = match result {
        Ok(_) => "ok".to_string(),
        Err(DispatchError::Timeout { .. }) => "timeout".to_string(),
        Err(e) if e.is_rejection() => format!("rejected: {}", e),
        Err(e) => format!("error: {}", e),
    };
    let audit = serde_json::json!({
        "event": "tool_audit",
        "actor": actor.name,
        "role": actor.role.to_string(),
        "tool": invocation.tool_name,
        "invocation_id": invocation.id,
        "ok": result.is_ok(),
        "outcome": outcome,
        "duration_ms": elapsed.as_millis() as u64,
        "args_preview": args_preview(&invocation.arguments),
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn args_preview(args: &serde_json::Map<String, serde_json::Value>) -> String {
    let s = serde_json::Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
