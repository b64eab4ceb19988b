use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{export::ExportFormat, storage::write_json_file};

use super::status_service::{DocStage, DocumentStatus};

pub const REPORT_FILE_NAME: &str = "batch_report.json";

/// Summary of one batch run, written next to the artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub export_format: ExportFormat,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus: Option<PathBuf>,
    pub documents: Vec<DocumentStatus>,
}

impl BatchReport {
    pub fn new(
        started_at: DateTime<Utc>,
        export_format: ExportFormat,
        input_dir: &Path,
        output_dir: &Path,
        documents: Vec<DocumentStatus>,
        corpus: Option<PathBuf>,
    ) -> Self {
        let succeeded = documents
            .iter()
            .filter(|doc| doc.stage == DocStage::Done)
            .count();
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            export_format,
            input_dir: input_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            succeeded,
            failed: documents.len() - succeeded,
            corpus,
            documents,
        }
    }

    pub fn total(&self) -> usize {
        self.documents.len()
    }

    pub async fn persist(&self) -> Result<PathBuf> {
        let path = self.output_dir.join(REPORT_FILE_NAME);
        write_json_file(&path, self).await?;
        Ok(path)
    }
}
