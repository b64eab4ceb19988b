use std::path::PathBuf;

use thiserror::Error;

/// Failure classes of a batch run. Only `Configuration` is fatal to the run;
/// the others are scoped to one document, one image or one chunk.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to ingest {path}: {reason}")]
    DocumentIngestion { path: PathBuf, reason: String },

    #[error("image recognition failed for {image}: {reason}")]
    ImageRecognition { image: String, reason: String },

    #[error("tagging failed for chunk {chunk_id}: {reason}")]
    ChunkTagging { chunk_id: usize, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to export {path}: {reason}")]
    Export { path: PathBuf, reason: String },
}

impl PipelineError {
    pub fn ingestion(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::DocumentIngestion {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn export(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Export {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Short label used in logs and in the batch report.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DocumentIngestion { .. } => "document_ingestion",
            Self::ImageRecognition { .. } => "image_recognition",
            Self::ChunkTagging { .. } => "chunk_tagging",
            Self::Configuration(_) => "configuration",
            Self::Export { .. } => "export",
        }
    }
}

/// Walks an `anyhow` chain and returns the label of the first typed failure.
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map(PipelineError::kind)
        .unwrap_or("internal")
}
