//! 引擎错误类型
//!
//! 只有 StorageError（上下文或会话记录无法持久化）是致命的；其余每轮错误都在分发边界被转换成
//! ToolOutcome 写入会话记录，交给下一个 Actor 处理。

use std::path::PathBuf;

use thiserror::Error;

/// 持久化失败：违反持久性约束，会话以 storage-failure 终止
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Corrupt file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 会话构建与收尾阶段的错误
#[derive(Error, Debug)]
pub enum AgencyError {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid roster: {0}")]
    InvalidRoster(String),

    /// Actor 决策失败（外部推理协作者出错）
    #[error("Decision failed: {0}")]
    DecisionFailed(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<config::ConfigError> for AgencyError {
    fn from(e: config::ConfigError) -> Self {
        AgencyError::ConfigError(e.to_string())
    }
}
