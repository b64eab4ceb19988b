use std::{collections::HashMap, fmt, sync::Arc};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{DocumentArtifacts, DocumentJob, ImageStats};

/// Per-document lifecycle. Stages only move forward; `Failed` is reachable
/// from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStage {
    Discovered,
    Ingested,
    Normalized,
    Chunked,
    Tagged,
    Exported,
    Done,
    Failed,
}

impl DocStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocStage::Done | DocStage::Failed)
    }

    pub fn next(self) -> Option<DocStage> {
        match self {
            DocStage::Discovered => Some(DocStage::Ingested),
            DocStage::Ingested => Some(DocStage::Normalized),
            DocStage::Normalized => Some(DocStage::Chunked),
            DocStage::Chunked => Some(DocStage::Tagged),
            DocStage::Tagged => Some(DocStage::Exported),
            DocStage::Exported => Some(DocStage::Done),
            DocStage::Done | DocStage::Failed => None,
        }
    }

    pub fn can_transition_to(self, target: DocStage) -> bool {
        if target == DocStage::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(target)
    }
}

impl fmt::Display for DocStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DocStage::Discovered => "discovered",
            DocStage::Ingested => "ingested",
            DocStage::Normalized => "normalized",
            DocStage::Chunked => "chunked",
            DocStage::Tagged => "tagged",
            DocStage::Exported => "exported",
            DocStage::Done => "done",
            DocStage::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Report entry for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub file_name: String,
    pub stem: String,
    pub stage: DocStage,
    /// Last stage reached before a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DocStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub chunk_count: usize,
    pub degraded_chunks: usize,
    pub images: ImageStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<DocumentArtifacts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentStatus {
    fn discovered(job: &DocumentJob) -> Self {
        Self {
            file_name: job.file_name.clone(),
            stem: job.stem.clone(),
            stage: DocStage::Discovered,
            failed_at: None,
            content_hash: None,
            chunk_count: 0,
            degraded_chunks: 0,
            images: ImageStats::default(),
            artifacts: None,
            error_kind: None,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// In-memory status of every document in a batch, shared by the workers.
#[derive(Clone, Default)]
pub struct DocStatusService {
    docs: Arc<RwLock<HashMap<usize, DocumentStatus>>>,
}

impl DocStatusService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, jobs: &[DocumentJob]) {
        let mut docs = self.docs.write().await;
        for job in jobs {
            docs.insert(job.index, DocumentStatus::discovered(job));
        }
    }

    pub async fn advance(&self, index: usize, target: DocStage) -> Result<()> {
        self.update(index, |status| {
            if !status.stage.can_transition_to(target) {
                return Err(anyhow!(
                    "illegal stage transition {} -> {} for {}",
                    status.stage,
                    target,
                    status.file_name
                ));
            }
            debug!(file = %status.file_name, from = %status.stage, to = %target, "document stage");
            status.stage = target;
            Ok(())
        })
        .await
    }

    /// Records extra fields without touching the stage.
    pub async fn annotate<F>(&self, index: usize, apply: F) -> Result<()>
    where
        F: FnOnce(&mut DocumentStatus),
    {
        self.update(index, |status| {
            apply(status);
            Ok(())
        })
        .await
    }

    pub async fn mark_failed(&self, index: usize, kind: &str, err: &anyhow::Error) -> Result<()> {
        self.update(index, |status| {
            if status.stage.is_terminal() {
                return Err(anyhow!(
                    "document {} already finished as {}",
                    status.file_name,
                    status.stage
                ));
            }
            debug!(file = %status.file_name, from = %status.stage, to = "failed", "document stage");
            status.failed_at = Some(status.stage);
            status.stage = DocStage::Failed;
            status.error_kind = Some(kind.to_string());
            status.error = Some(format!("{err:#}"));
            Ok(())
        })
        .await
    }

    pub async fn get(&self, index: usize) -> Option<DocumentStatus> {
        self.docs.read().await.get(&index).cloned()
    }

    /// Snapshot in discovery order.
    pub async fn snapshot(&self) -> Vec<DocumentStatus> {
        let docs = self.docs.read().await;
        let mut indexed: Vec<(&usize, &DocumentStatus)> = docs.iter().collect();
        indexed.sort_by_key(|(index, _)| **index);
        indexed.into_iter().map(|(_, status)| status.clone()).collect()
    }

    async fn update<F>(&self, index: usize, apply: F) -> Result<()>
    where
        F: FnOnce(&mut DocumentStatus) -> Result<()>,
    {
        let mut docs = self.docs.write().await;
        let status = docs
            .get_mut(&index)
            .ok_or_else(|| anyhow!("unknown document index {index}"))?;
        apply(status)?;
        status.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn job(index: usize, name: &str) -> DocumentJob {
        DocumentJob {
            index,
            path: PathBuf::from(name),
            file_name: name.to_string(),
            stem: name.trim_end_matches(".docx").to_string(),
        }
    }

    #[test]
    fn stages_only_move_forward() {
        assert!(DocStage::Discovered.can_transition_to(DocStage::Ingested));
        assert!(!DocStage::Discovered.can_transition_to(DocStage::Chunked));
        assert!(!DocStage::Tagged.can_transition_to(DocStage::Chunked));
        assert!(DocStage::Chunked.can_transition_to(DocStage::Failed));
        assert!(!DocStage::Done.can_transition_to(DocStage::Failed));
        assert!(!DocStage::Failed.can_transition_to(DocStage::Failed));
    }

    #[tokio::test]
    async fn failure_keeps_the_last_stage_reached() -> Result<()> {
        let service = DocStatusService::new();
        service.register(&[job(0, "a.docx"), job(1, "b.docx")]).await;

        service.advance(0, DocStage::Ingested).await?;
        service.mark_failed(0, "export", &anyhow!("disk full")).await?;
        assert!(service.advance(0, DocStage::Normalized).await.is_err());
        assert!(service.advance(1, DocStage::Tagged).await.is_err());

        let snapshot = service.snapshot().await;
        assert_eq!(snapshot[0].stage, DocStage::Failed);
        assert_eq!(snapshot[0].failed_at, Some(DocStage::Ingested));
        assert_eq!(snapshot[0].error.as_deref(), Some("disk full"));
        assert_eq!(snapshot[1].stage, DocStage::Discovered);
        Ok(())
    }
}
