//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{ChatMessage, ChatRole, LlmClient, LlmError};

use crate::config::AppConfig;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// 按配置创建客户端；provider 为 mock 或找不到 API Key 时回退到 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let key = match provider.as_str() {
        "mock" => None,
        "deepseek" => std::env::var("DEEPSEEK_API_KEY")
            .ok()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        _ => std::env::var("OPENAI_API_KEY").ok(),
    };

    let Some(key) = key else {
        tracing::warn!(provider = %provider, "no API key configured, using mock LLM");
        return Arc::new(MockLlmClient::new(cfg.session.termination_token.clone()));
    };

    let base_url = cfg.llm.base_url.clone().or_else(|| {
        (provider == "deepseek").then(|| DEEPSEEK_BASE_URL.to_string())
    });
    tracing::info!(provider = %provider, model = %cfg.llm.model, "LLM client ready");
    Arc::new(OpenAiClient::new(
        base_url.as_deref(),
        &cfg.llm.model,
        Some(key.as_str()),
    ))
}
