//! LLM 驱动的 Decider
//!
//! 把会话记录转换成对话消息（自己的发言为 assistant，其他人的为 user，带发送者前缀），
//! 拼上角色提示词、项目上下文与可用工具 schema 后调用 LlmClient；回复由 parse_action 解析。

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::actor::{Action, Decider};
use crate::core::AgencyError;
use crate::llm::{ChatMessage, LlmClient};
use crate::memory::{ContextHandle, Message, MessageBody, ToolInvocation};
use crate::tools::schema::{tool_call_schema_json, ToolCallFormat};
use crate::tools::ToolRegistry;

/// 解析 LLM 输出：含有效 JSON 且 tool 非空则为工具请求，否则整段作为文本
pub fn parse_action(output: &str) -> Action {
    let trimmed = output.trim();

    // ```json ... ``` 或裸 JSON
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            return Action::text(trimmed);
        }
    } else {
        return Action::text(trimmed);
    };

    match serde_json::from_str::<ToolCallFormat>(json_str) {
        Ok(call) if !call.tool.trim().is_empty() => {
            Action::ToolRequest(ToolInvocation::new(call.tool.trim(), call.args))
        }
        _ => Action::text(trimmed),
    }
}

pub struct LlmDecider {
    name: String,
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    registry: Arc<ToolRegistry>,
    context: Option<ContextHandle>,
}

impl LlmDecider {
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        system_prompt: impl Into<String>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            llm,
            system_prompt: system_prompt.into(),
            registry,
            context: None,
        }
    }

    /// 每次决策前把当前项目上下文拼进 system prompt
    pub fn with_context(mut self, context: ContextHandle) -> Self {
        self.context = Some(context);
        self
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    async fn system_message(&self, capabilities: &BTreeSet<String>) -> String {
        let mut system = self.system_prompt.clone();
        if let Some(ctx) = &self.context {
            let store = ctx.lock().await;
            system.push_str("\n\n");
            system.push_str(&store.get().prompt_section());
        }
        if !capabilities.is_empty() {
            system.push_str(
                "\n\nTo call a tool, reply with a single JSON object and nothing else. Format:\n",
            );
            system.push_str(&tool_call_schema_json());
            system.push_str("\nAvailable tools:\n");
            system.push_str(&self.registry.to_schema_json(capabilities));
        }
        system
    }

    fn to_chat(&self, transcript: &[Message]) -> Vec<ChatMessage> {
        transcript
            .iter()
            .map(|m| {
                let own = m.sender == self.name;
                match &m.body {
                    MessageBody::Text(t) if own => ChatMessage::assistant(t.clone()),
                    MessageBody::ToolRequest(inv) if own => ChatMessage::assistant(
                        serde_json::json!({"tool": inv.tool_name, "args": inv.arguments})
                            .to_string(),
                    ),
                    _ => ChatMessage::user(format!("{}: {}", m.sender, m.render())),
                }
            })
            .collect()
    }
}

#[async_trait]
impl Decider for LlmDecider {
    async fn decide(
        &self,
        transcript: &[Message],
        capabilities: &BTreeSet<String>,
    ) -> Result<Action, AgencyError> {
        let mut messages = vec![ChatMessage::system(self.system_message(capabilities).await)];
        messages.extend(self.to_chat(transcript));
        let reply = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| AgencyError::LlmError(e.to_string()))?;
        tracing::debug!(actor = %self.name, reply_len = reply.len(), "llm reply");
        Ok(parse_action(&reply))
    }
}
