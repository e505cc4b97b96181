//! 操作员确认通道
//!
//! 需要人工确认的 Actor 请求工具时，分发层在调用处理器之前挂起并询问操作员：同意才执行，拒绝即短路。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::actor::Actor;
use crate::memory::ToolInvocation;

/// 同步的是/否询问；由面向人类的协作方实现
#[async_trait]
pub trait ConfirmationChannel: Send + Sync {
    async fn confirm(&self, actor: &Actor, invocation: &ToolInvocation) -> bool;
}

/// 一律同意
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationChannel for AutoApprove {
    async fn confirm(&self, _actor: &Actor, _invocation: &ToolInvocation) -> bool {
        true
    }
}

/// 按预设答案依次回复；答案用完后使用 fallback。记录被询问次数
#[derive(Debug)]
pub struct ScriptedConfirmation {
    answers: Mutex<VecDeque<bool>>,
    fallback: bool,
    asked: AtomicUsize,
}

impl ScriptedConfirmation {
    pub fn new(answers: impl IntoIterator<Item = bool>, fallback: bool) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            fallback,
            asked: AtomicUsize::new(0),
        }
    }

    /// 一律拒绝
    pub fn deny_all() -> Self {
        Self::new([], false)
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfirmationChannel for ScriptedConfirmation {
    async fn confirm(&self, actor: &Actor, invocation: &ToolInvocation) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        let answer = self
            .answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .unwrap_or(self.fallback);
        tracing::debug!(actor = %actor.name, tool = %invocation.tool_name, answer, "scripted confirmation");
        answer
    }
}
