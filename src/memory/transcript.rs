//! 会话记录（Transcript）
//!
//! 只追加的有序消息序列：sequence 从 1 开始连续递增；ToolResult 永远紧跟在同一 invocation id 的
//! ToolRequest 之后（由 record_exchange 一次性写入两条消息来保证）。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 工具调用成功
pub const STATUS_OK: i32 = 0;
/// 工具调用失败（未知工具、无权限、参数错误、拒绝、处理器故障等统一为 1）
pub const STATUS_FAILURE: i32 = 1;
/// 等待超时（工具执行或人工确认）
pub const STATUS_TIMEOUT: i32 = 2;

/// 一次工具调用请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// 唯一调用 id；为空视为协议违规
    pub id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    /// 以随机 uuid 作为 id 创建调用
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// 一次工具调用的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub invocation_id: String,
    pub status_code: i32,
    pub payload: String,
}

impl ToolOutcome {
    pub fn success(invocation_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            status_code: STATUS_OK,
            payload: payload.into(),
        }
    }

    pub fn failure(invocation_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            status_code: STATUS_FAILURE,
            payload: payload.into(),
        }
    }

    pub fn timeout(invocation_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            status_code: STATUS_TIMEOUT,
            payload: payload.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    ToolRequest,
    ToolResult,
}

/// 消息体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum MessageBody {
    Text(String),
    ToolRequest(ToolInvocation),
    ToolResult(ToolOutcome),
}

/// 会话中的单条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sequence: u64,
    /// 发送者（Actor 名称）
    pub sender: String,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self.body {
            MessageBody::Text(_) => MessageKind::Text,
            MessageBody::ToolRequest(_) => MessageKind::ToolRequest,
            MessageBody::ToolResult(_) => MessageKind::ToolResult,
        }
    }

    /// 文本消息内容；非文本返回 None
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(t) => Some(t),
            _ => None,
        }
    }

    /// 单行可读表示，用于导出与日志
    pub fn render(&self) -> String {
        match &self.body {
            MessageBody::Text(t) => t.clone(),
            MessageBody::ToolRequest(inv) => format!(
                "[tool request {}] {}({})",
                inv.id,
                inv.tool_name,
                Value::Object(inv.arguments.clone())
            ),
            MessageBody::ToolResult(out) => format!(
                "[tool result {}] status={} {}",
                out.invocation_id, out.status_code, out.payload
            ),
        }
    }
}

/// 只追加的会话记录
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&self) -> u64 {
        self.messages.len() as u64 + 1
    }

    fn append(&mut self, sender: &str, body: MessageBody) -> u64 {
        let sequence = self.next_sequence();
        self.messages.push(Message {
            sequence,
            sender: sender.to_string(),
            body,
        });
        sequence
    }

    /// 追加文本消息，返回其 sequence
    pub fn push_text(&mut self, sender: &str, text: impl Into<String>) -> u64 {
        self.append(sender, MessageBody::Text(text.into()))
    }

    /// 追加一次完整的工具交换：ToolRequest 紧跟 ToolResult；
    /// outcome 的 invocation_id 被强制对齐为请求的 id。返回 (request_seq, result_seq)
    pub fn record_exchange(
        &mut self,
        sender: &str,
        invocation: ToolInvocation,
        mut outcome: ToolOutcome,
    ) -> (u64, u64) {
        outcome.invocation_id = invocation.id.clone();
        let req = self.append(sender, MessageBody::ToolRequest(invocation));
        let res = self.append(sender, MessageBody::ToolResult(outcome));
        (req, res)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 最后一条文本消息
    pub fn last_text(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.kind() == MessageKind::Text)
    }
}
