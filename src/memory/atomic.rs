//! 原子写文件：先写同目录临时文件并 fsync，再 rename 覆盖目标
//!
//! 读者只会看到旧内容或新内容，不会看到写了一半的文件。

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::core::StorageError;

/// 目标文件对应的临时文件：同目录下的 `.<name>.tmp`
pub fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// 原子写入；父目录不存在时自动创建
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }

    let tmp = temp_path(path);
    let result = match write_synced(&tmp, contents).await {
        Ok(()) => fs::rename(&tmp, path)
            .await
            .map_err(|e| StorageError::io(path, e)),
        Err(e) => Err(StorageError::io(&tmp, e)),
    };
    if result.is_err() {
        // 任何一步失败都不留下临时文件
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

async fn write_synced(tmp: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}
