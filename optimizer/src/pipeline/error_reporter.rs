use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use tracing::error;

use crate::error::error_kind;

use super::{status_service::DocStatusService, types::DocumentJob};

/// Logs a per-document failure with its cause chain and records it against
/// the document. The batch keeps running.
pub struct ErrorReporter {
    status: DocStatusService,
    failures: AtomicUsize,
}

impl ErrorReporter {
    pub fn new(status: DocStatusService) -> Self {
        Self {
            status,
            failures: AtomicUsize::new(0),
        }
    }

    pub async fn record(&self, job: &DocumentJob, err: &anyhow::Error) -> Result<()> {
        let kind = error_kind(err);
        error!(file = %job.file_name, kind, error = %err, "failed to process document");
        for (depth, cause) in err.chain().skip(1).enumerate() {
            error!(
                file = %job.file_name,
                cause_depth = depth + 1,
                cause = %cause,
                "caused by"
            );
        }

        self.failures.fetch_add(1, Ordering::Relaxed);
        self.status.mark_failed(job.index, kind, err).await
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }
}
