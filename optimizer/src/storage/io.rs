use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

pub async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    Ok(())
}

pub async fn read_json_file<T>(path: &Path) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    let bytes = match fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => return Ok(None),
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let value = serde_json::from_slice::<T>(&bytes)
        .with_context(|| format!("invalid json in {}", path.display()))?;
    Ok(Some(value))
}

/// Atomically write pretty json to disk using a temp file + rename.
pub async fn write_json_file<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).await
}

/// One compact json document per line, newline terminated.
pub async fn write_jsonl_file<T>(path: &Path, values: &[T]) -> Result<()>
where
    T: Serialize,
{
    let mut buffer = Vec::new();
    for value in values {
        serde_json::to_writer(&mut buffer, value)?;
        buffer.push(b'\n');
    }
    write_atomic(path, &buffer).await
}

/// Concatenates `sources` in the given order into `target`.
pub async fn concat_files(sources: &[PathBuf], target: &Path) -> Result<()> {
    let mut buffer = Vec::new();
    for source in sources {
        let bytes = fs::read(source)
            .await
            .with_context(|| format!("failed to read {}", source.display()))?;
        buffer.extend_from_slice(&bytes);
        if !bytes.is_empty() && !bytes.ends_with(b"\n") {
            buffer.push(b'\n');
        }
    }
    write_atomic(target, &buffer).await
}

/// The write is fsync'd before the rename to ensure durability.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent_dir(path).await?;

    let tmp_path = temp_path(path);

    let file = fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;
    let written = write_and_rename(file, bytes, &tmp_path, path).await;

    if written.is_err() {
        if let Err(err) = fs::remove_file(&tmp_path).await {
            warn!(path = %tmp_path.display(), error = %err, "failed to remove temp file");
        }
    }
    written
}

async fn write_and_rename(
    mut file: fs::File,
    bytes: &[u8],
    tmp_path: &Path,
    path: &Path,
) -> Result<()> {
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(tmp_path, path)
        .await
        .with_context(|| format!("failed to move {} into place", path.display()))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|name| format!("{}.tmp", name.to_string_lossy()))
        .unwrap_or_else(|| "tmp.json".to_string());
    tmp.set_file_name(file_name);
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_rename_leaves_no_temp_file() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let target = dir.path().join("doc.json");
        std::fs::create_dir(&target)?;
        std::fs::write(target.join("occupied"), b"x")?;

        assert!(write_json_file(&target, &vec![1, 2, 3]).await.is_err());
        assert!(!dir.path().join("doc.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn jsonl_round_trips_through_concat() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        write_jsonl_file(&a, &["x"]).await?;
        write_jsonl_file(&b, &["y", "z"]).await?;

        let joined = dir.path().join("all.jsonl");
        concat_files(&[b, a], &joined).await?;
        assert_eq!(std::fs::read_to_string(&joined)?, "\"y\"\n\"z\"\n\"x\"\n");
        assert!(!dir.path().join("all.jsonl.tmp").exists());
        Ok(())
    }
}
