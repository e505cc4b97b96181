//! 会话导出
//!
//! 会话结束时把 SessionSummary 写到工作目录：chat_results.json（完整结构）与 chat_results.txt（可读文本）。
//! 只写不读，引擎不会再消费这些文件。

use std::path::{Path, PathBuf};

use crate::core::{SessionSummary, StorageError};
use crate::memory::atomic::write_atomic;

pub const SUMMARY_JSON: &str = "chat_results.json";
pub const SUMMARY_TEXT: &str = "chat_results.txt";

/// 会话导出器：绑定输出目录
#[derive(Debug, Clone)]
pub struct SessionExporter {
    dir: PathBuf,
}

impl SessionExporter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn json_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_JSON)
    }

    pub fn text_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_TEXT)
    }

    /// 写出 JSON 与文本两份导出物
    pub async fn export(&self, summary: &SessionSummary) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(summary)?;
        write_atomic(&self.json_path(), json.as_bytes()).await?;
        write_atomic(&self.text_path(), render_text(summary).as_bytes()).await?;
        tracing::info!(dir = %self.dir.display(), session = %summary.session_id, "session exported");
        Ok(())
    }
}

/// 文本导出格式
pub fn render_text(summary: &SessionSummary) -> String {
    let mut out = String::new();
    out.push_str("Chat Summary:\n");
    out.push_str(&summary.outcome);
    out.push_str("\n\n");
    if let Some(fatal) = &summary.fatal {
        out.push_str(&format!("Fatal: {}\n\n", fatal));
    }
    out.push_str("Chat History:\n");
    for m in &summary.transcript {
        out.push_str(&format!("{}: {}\n", m.sender, m.render()));
    }
    out
}
