use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::{error::PipelineError, storage::concat_files};

use super::ExportFormat;

pub fn corpus_path(output_dir: &Path, format: ExportFormat) -> PathBuf {
    output_dir.join(format!("{}_corpus.jsonl", format.dir_name()))
}

/// Concatenates per-document artifacts in the order given, which callers
/// keep equal to discovery order. Runs after every worker has finished.
pub async fn build_corpus(
    output_dir: &Path,
    format: ExportFormat,
    artifacts: &[PathBuf],
) -> Result<Option<PathBuf>> {
    if !format.is_line_oriented() {
        return Ok(None);
    }

    let target = corpus_path(output_dir, format);
    concat_files(artifacts, &target)
        .await
        .map_err(|err| PipelineError::export(&target, format!("{err:#}")))?;

    info!(
        path = %target.display(),
        documents = artifacts.len(),
        "corpus assembled"
    );
    Ok(Some(target))
}
