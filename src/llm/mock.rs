//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 第一次被问到时说一句话并把发言权交还，之后直接回复终止令牌，保证离线会话一定能结束。

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::llm::{ChatMessage, ChatRole, LlmClient, LlmError};

#[derive(Debug)]
pub struct MockLlmClient {
    termination_token: String,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new(termination_token: impl Into<String>) -> Self {
        Self {
            termination_token: termination_token.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new(crate::actor::selector::DEFAULT_TERMINATION_TOKEN)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n > 0 {
            return Ok(format!("All done. {}", self.termination_token));
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }
}
