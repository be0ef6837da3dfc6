//! File system helpers.

use anyhow::{Context, Result};
use std::path::Path;

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// The content goes to a uniquely named temporary file in the same directory,
/// is synced, and is then renamed over `path`. Readers observe either the old
/// content or the new content, never a partial write, even when several
/// writers race on the same path.
pub async fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file_name = path.file_name().map_or_else(|| "file".into(), |n| n.to_string_lossy());
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    let write = async {
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        file.write_all(content)
            .await
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;
        file.sync_all().await.context("Failed to sync file to disk")?;
        tokio::fs::rename(&temp_path, path)
            .await
            .with_context(|| format!("Failed to rename temp file to: {}", path.display()))
    };

    let result = write.await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}
