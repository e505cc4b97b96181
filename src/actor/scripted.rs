//! 脚本化 Decider（测试与本地演练用，无需推理后端）
//!
//! 按顺序返回预先给定的动作；脚本用完后返回固定的空闲文本。

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::actor::{Action, Decider};
use crate::core::AgencyError;
use crate::memory::Message;

/// 脚本用完后的默认回复
pub const IDLE_TEXT: &str = "(idle)";

/// 一条脚本步骤
#[derive(Clone, Debug)]
enum Step {
    Act(Action),
    Fail(String),
    Stall(Duration, Action),
}

/// 按脚本返回动作的 Decider；可统计被调用次数
#[derive(Debug, Default)]
pub struct ScriptedDecider {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    /// 每次 decide 时看到的会话记录长度
    seen: Mutex<Vec<usize>>,
}

impl ScriptedDecider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由一组动作构建
    pub fn with_actions(actions: impl IntoIterator<Item = Action>) -> Self {
        let d = Self::new();
        for a in actions {
            d.push(a);
        }
        d
    }

    pub fn push(&self, action: Action) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(Step::Act(action));
        }
    }

    /// 下一次 decide 返回错误
    pub fn push_failure(&self, reason: impl Into<String>) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(Step::Fail(reason.into()));
        }
    }

    /// 下一次 decide 先等待 delay 再返回 action（用于超时与取消测试）
    pub fn push_stall(&self, delay: Duration, action: Action) {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(Step::Stall(delay, action));
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_lengths(&self) -> Vec<usize> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Decider for ScriptedDecider {
    async fn decide(
        &self,
        transcript: &[Message],
        _capabilities: &BTreeSet<String>,
    ) -> Result<Action, AgencyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(transcript.len());
        }
        let step = self.steps.lock().ok().and_then(|mut s| s.pop_front());
        match step {
            Some(Step::Act(action)) => Ok(action),
            Some(Step::Fail(reason)) => Err(AgencyError::DecisionFailed(reason)),
            Some(Step::Stall(delay, action)) => {
                tokio::time::sleep(delay).await;
                Ok(action)
            }
            None => Ok(Action::text(IDLE_TEXT)),
        }
    }
}
