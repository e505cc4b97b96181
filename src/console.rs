//! 控制台协作方：Admin 的人工输入与操作员确认，都走 stdin
//!
//! 两者共享同一个行读取器；编排循环是顺序的，不会同时读。

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::actor::{Action, Actor, Decider};
use crate::core::{AgencyError, ConfirmationChannel};
use crate::memory::{Message, ToolInvocation};

/// 跳过本轮时记录的文本
pub const SKIP_TEXT: &str = "(no input)";

/// 解析一行人工输入
///
/// - 空行：跳过
/// - `exit`：以终止标记结束会话
/// - `/tool <name> <json>`：以 Admin 身份请求工具
/// - 其他：原样作为文本
pub fn parse_console_line(line: &str, termination_token: &str) -> Result<Action, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Action::text(SKIP_TEXT));
    }
    if line.eq_ignore_ascii_case("exit") {
        return Ok(Action::text(termination_token));
    }
    if let Some(rest) = line.strip_prefix("/tool") {
        let rest = rest.trim();
        let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, "{}"));
        if name.is_empty() {
            return Err("usage: /tool <name> {json args}".to_string());
        }
        let args: serde_json::Value =
            serde_json::from_str(args.trim()).map_err(|e| format!("bad JSON arguments: {}", e))?;
        let serde_json::Value::Object(args) = args else {
            return Err("tool arguments must be a JSON object".to_string());
        };
        return Ok(Action::ToolRequest(ToolInvocation::new(name, args)));
    }
    Ok(Action::text(line))
}

pub struct Console {
    lines: Mutex<Lines<BufReader<Stdin>>>,
    termination_token: String,
}

impl Console {
    pub fn new(termination_token: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            termination_token: termination_token.into(),
        })
    }

    /// 打印提示并读一行；EOF 返回 None
    async fn ask(&self, prompt: &str) -> Option<String> {
        let mut out = tokio::io::stdout();
        let _ = out.write_all(prompt.as_bytes()).await;
        let _ = out.flush().await;
        match self.lines.lock().await.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                None
            }
        }
    }
}

#[async_trait]
impl Decider for Console {
    async fn decide(
        &self,
        _transcript: &[Message],
        capabilities: &BTreeSet<String>,
    ) -> Result<Action, AgencyError> {
        let tools = capabilities.iter().cloned().collect::<Vec<_>>().join(", ");
        let prompt = format!(
            "\nYour turn (enter to skip, 'exit' to finish, '/tool <name> {{json}}' to call one of: {})\n> ",
            tools
        );
        loop {
            let Some(line) = self.ask(&prompt).await else {
                // stdin 关闭视为结束
                return Ok(Action::text(self.termination_token.clone()));
            };
            match parse_console_line(&line, &self.termination_token) {
                Ok(action) => return Ok(action),
                Err(msg) => println!("{}", msg),
            }
        }
    }
}

#[async_trait]
impl ConfirmationChannel for Console {
    async fn confirm(&self, actor: &Actor, invocation: &ToolInvocation) -> bool {
        let prompt = format!(
            "\n{} wants to run {} {}. Allow? [y/N] ",
            actor.name,
            invocation.tool_name,
            serde_json::Value::Object(invocation.arguments.clone())
        );
        match self.ask(&prompt).await {
            Some(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            None => false,
        }
    }
}
