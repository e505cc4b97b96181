//! 共享项目上下文（Shared Context）
//!
//! 每个项目一个 JSON 文件（`<workspace>/docs/project_context.json`）。会话开始时加载，不存在则用空默认值
//! （只读不建文件）；只允许 update_context 工具通过 ContextPatch 浅合并修改，每次成功修改后立即原子写回。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::core::StorageError;
use crate::memory::atomic::write_atomic;

/// 上下文文件相对工作目录的位置
pub const CONTEXT_FILE: &str = "docs/project_context.json";

/// 项目状态记录；未知的顶层键原样保留
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedContext {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tech_stack: BTreeSet<String>,
    #[serde(default)]
    pub features: BTreeSet<String>,
    #[serde(default)]
    pub current_state: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// update_context 的参数：出现的键整体覆盖旧值，未出现的键保持不变
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ContextPatch {
    /// 项目名称
    pub name: Option<String>,
    /// 项目描述
    pub description: Option<String>,
    /// 技术栈（整体替换）
    pub tech_stack: Option<BTreeSet<String>>,
    /// 已实现的功能（整体替换）
    pub features: Option<BTreeSet<String>>,
    /// 当前状态（整体替换）
    pub current_state: Option<Map<String, Value>>,
    /// 其它自定义顶层键
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContextPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.tech_stack.is_none()
            && self.features.is_none()
            && self.current_state.is_none()
            && self.extra.is_empty()
    }
}

impl SharedContext {
    /// 浅合并
    pub fn merge(&mut self, patch: ContextPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(tech_stack) = patch.tech_stack {
            self.tech_stack = tech_stack;
        }
        if let Some(features) = patch.features {
            self.features = features;
        }
        if let Some(current_state) = patch.current_state {
            self.current_state = current_state;
        }
        for (k, v) in patch.extra {
            self.extra.insert(k, v);
        }
    }

    /// 供 Planner system prompt 使用的上下文段落
    pub fn prompt_section(&self) -> String {
        format!(
            "Current Project Context:\n- Project Name: {}\n- Description: {}\n- Tech Stack: {}\n- Implemented Features: {}",
            self.name,
            self.description,
            self.tech_stack.iter().cloned().collect::<Vec<_>>().join(", "),
            self.features.iter().cloned().collect::<Vec<_>>().join(", "),
        )
    }
}

/// 会话内共享的上下文句柄（工具通过 ToolContext 拿到）
pub type ContextHandle = Arc<Mutex<SharedContextStore>>;

/// 上下文存储：内存中的当前值 + 写穿到磁盘
#[derive(Debug)]
pub struct SharedContextStore {
    path: PathBuf,
    current: SharedContext,
}

impl SharedContextStore {
    /// 工作目录下的上下文文件路径
    pub fn path_for(workspace: &Path) -> PathBuf {
        workspace.join(CONTEXT_FILE)
    }

    /// 打开工作目录下的上下文；文件不存在时使用空默认值
    pub async fn open(workspace: &Path) -> Result<Self, StorageError> {
        let path = Self::path_for(workspace);
        let current = Self::load(&path).await?;
        Ok(Self { path, current })
    }

    /// 从文件读取；不存在返回默认值，解析失败返回 Corrupt
    pub async fn load(path: &Path) -> Result<SharedContext, StorageError> {
        match tokio::fs::read_to_string(path).await {
            Ok(data) => serde_json::from_str(&data).map_err(|source| StorageError::Corrupt {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SharedContext::default()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    pub fn into_handle(self) -> ContextHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> &SharedContext {
        &self.current
    }

    /// 合并并写回；空补丁不写盘并返回 false。写盘失败时内存值保持不变
    pub async fn update(&mut self, patch: ContextPatch) -> Result<bool, StorageError> {
        if patch.is_empty() {
            return Ok(false);
        }
        let mut next = self.current.clone();
        next.merge(patch);
        let data = serde_json::to_string_pretty(&next)?;
        write_atomic(&self.path, data.as_bytes()).await?;
        self.current = next;
        tracing::info!(path = %self.path.display(), "shared context persisted");
        Ok(true)
    }

    /// 重新从磁盘加载
    pub async fn reload(&mut self) -> Result<&SharedContext, StorageError> {
        self.current = Self::load(&self.path).await?;
        Ok(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::atomic::temp_path;
    use tempfile::TempDir;

    fn patch(value: Value) -> ContextPatch {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults_without_creating() {
        let dir = TempDir::new().unwrap();
        let store = SharedContextStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get(), &SharedContext::default());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_update_merges_and_preserves_prior_fields() {
        let dir = TempDir::new().unwrap();
        let mut store = SharedContextStore::open(dir.path()).await.unwrap();
        store
            .update(patch(serde_json::json!({
                "name": "todo",
                "description": "simple todo list",
                "tech_stack": ["react"]
            })))
            .await
            .unwrap();
        store
            .update(patch(serde_json::json!({"features": ["add item", "remove item"]})))
            .await
            .unwrap();

        let reloaded = store.reload().await.unwrap().clone();
        assert_eq!(reloaded.name, "todo");
        assert_eq!(reloaded.description, "simple todo list");
        assert!(reloaded.tech_stack.contains("react"));
        assert_eq!(reloaded.features.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_keys_survive_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = SharedContextStore::open(dir.path()).await.unwrap();
        store
            .update(patch(serde_json::json!({"deadline": "friday"})))
            .await
            .unwrap();
        let reloaded = store.reload().await.unwrap();
        assert_eq!(reloaded.extra["deadline"], "friday");
    }

    #[tokio::test]
    async fn test_empty_patch_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut store = SharedContextStore::open(dir.path()).await.unwrap();
        assert!(!store.update(ContextPatch::default()).await.unwrap());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_old_file_and_memory() {
        let dir = TempDir::new().unwrap();
        let mut store = SharedContextStore::open(dir.path()).await.unwrap();
        store
            .update(patch(serde_json::json!({"name": "old"})))
            .await
            .unwrap();

        // 模拟写到一半失败：临时文件位置被占用
        std::fs::create_dir(temp_path(store.path())).unwrap();
        let err = store
            .update(patch(serde_json::json!({"name": "new"})))
            .await;
        assert!(err.is_err());
        assert_eq!(store.get().name, "old");

        let on_disk = SharedContextStore::load(store.path()).await.unwrap();
        assert_eq!(on_disk.name, "old");
    }

    #[tokio::test]
    async fn test_leftover_partial_temp_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut store = SharedContextStore::open(dir.path()).await.unwrap();
        store
            .update(patch(serde_json::json!({"name": "stable"})))
            .await
            .unwrap();

        // 崩溃残留的半截临时文件
        std::fs::write(temp_path(store.path()), "{\"name\": \"trunc").unwrap();
        let on_disk = SharedContextStore::load(store.path()).await.unwrap();
        assert_eq!(on_disk.name, "stable");

        // 下一次写入覆盖残留临时文件
        store
            .update(patch(serde_json::json!({"name": "next"})))
            .await
            .unwrap();
        assert_eq!(store.reload().await.unwrap().name, "next");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = SharedContextStore::path_for(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();
        let err = SharedContextStore::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn test_patch_rejects_wrong_types() {
        let res: Result<ContextPatch, _> =
            serde_json::from_value(serde_json::json!({"features": "not a list"}));
        assert!(res.is_err());
    }
}
