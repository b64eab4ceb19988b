use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::{error::PipelineError, nlp::PipelineContext};

use super::{
    docx::{DocxOptions, read_docx},
    document_manager::FileRepository,
    types::ExtractedDocument,
    utils::compute_content_hash,
};

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Raw text of the document. Only a container that cannot be opened or
    /// parsed is an error.
    async fn extract(&self, file_path: &Path, ctx: &PipelineContext) -> Result<ExtractedDocument>;
}

#[derive(Clone)]
pub struct DocxExtractor {
    file_repo: Arc<dyn FileRepository>,
    options: DocxOptions,
}

impl DocxExtractor {
    pub fn new(file_repo: Arc<dyn FileRepository>, options: DocxOptions) -> Self {
        Self { file_repo, options }
    }
}

#[async_trait]
impl DocumentExtractor for DocxExtractor {
    async fn extract(&self, file_path: &Path, ctx: &PipelineContext) -> Result<ExtractedDocument> {
        let bytes = self
            .file_repo
            .read(file_path)
            .await
            .map_err(|err| PipelineError::ingestion(file_path, format!("{err:#}")))?;
        if bytes.is_empty() {
            return Err(PipelineError::ingestion(file_path, "file is empty").into());
        }

        let content_hash = compute_content_hash(&bytes);
        let path = file_path.to_path_buf();
        let ocr = ctx.ocr.clone();
        let options = self.options;

        let parsed = tokio::task::spawn_blocking(move || {
            read_docx(&bytes, &path, ocr.as_deref(), options)
        })
        .await
        .context("docx reader task panicked")??;

        Ok(ExtractedDocument {
            text: parsed.text,
            content_hash,
            images: parsed.images,
        })
    }
}
