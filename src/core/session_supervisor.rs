//! 会话监管：取消与挂起点的等待上限
//!
//! 持有 CancellationToken，操作员取消后在下一个挂起点（等待决策、等待确认、回合之间）生效，
//! 不会打断正在执行的工具处理器。

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// 会话级生命周期管理
#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    cancel_token: CancellationToken,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    /// 绑定外部令牌（多个会话可由同一父令牌派生子令牌）
    pub fn with_token(cancel_token: CancellationToken) -> Self {
        Self { cancel_token }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 操作员取消
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 创建子 token（用于单个会话）
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// 可选上限的等待：bound 为 None 时无限等待；超时返回 None
pub async fn bounded<F: Future>(bound: Option<Duration>, fut: F) -> Option<F::Output> {
    match bound {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// 把秒数配置转成可选上限：0 表示不限
pub fn secs_to_bound(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}
