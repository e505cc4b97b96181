//! 存储层：会话记录、共享项目上下文、原子写与会话导出

pub mod atomic;
pub mod context;
pub mod persistence;
pub mod transcript;

pub use context::{ContextHandle, ContextPatch, SharedContext, SharedContextStore};
pub use persistence::SessionExporter;
pub use transcript::{
    Message, MessageBody, MessageKind, ToolInvocation, ToolOutcome, Transcript, STATUS_FAILURE,
    STATUS_OK, STATUS_TIMEOUT,
};
