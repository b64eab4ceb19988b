use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{
    Mutex,
    mpsc::{self, Receiver, Sender},
};
use tracing::{debug, error, info};

use crate::{
    error::PipelineError,
    nlp::{ContextFactory, PipelineContext},
};

use super::types::{DocumentArtifacts, DocumentJob};

/// What a worker produces for one finished document.
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub artifacts: DocumentArtifacts,
    pub chunk_count: usize,
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, ctx: &PipelineContext, job: &DocumentJob) -> Result<DocumentOutcome>;
}

pub struct JobDispatch {
    pub job: DocumentJob,
}

pub struct JobResult {
    pub job: DocumentJob,
    pub worker_id: usize,
    pub outcome: Result<DocumentOutcome>,
}

/// Fixed-size pool. Every worker owns one context and takes documents off a
/// shared queue until it is drained; results come back in completion order.
pub struct Scheduler {
    workers: usize,
    context_factory: ContextFactory,
}

impl Scheduler {
    pub fn new(workers: usize, context_factory: ContextFactory) -> Result<Self, PipelineError> {
        if workers == 0 {
            return Err(PipelineError::config("workers must be greater than zero"));
        }
        Ok(Self {
            workers,
            context_factory,
        })
    }

    pub async fn run(
        &self,
        jobs: Vec<DocumentJob>,
        handler: Arc<dyn JobHandler>,
    ) -> Result<Vec<JobResult>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let pool_size = self.workers.min(jobs.len());
        let contexts = self.build_contexts(pool_size)?;

        let (work_tx, work_rx) = mpsc::channel::<JobDispatch>(jobs.len());
        let (result_tx, mut result_rx) = mpsc::channel::<JobResult>(jobs.len());

        for job in jobs {
            if work_tx.send(JobDispatch { job }).await.is_err() {
                break;
            }
        }
        drop(work_tx);

        let work_rx = Arc::new(Mutex::new(work_rx));
        let handles: Vec<_> = contexts
            .into_iter()
            .enumerate()
            .map(|(worker_id, ctx)| {
                tokio::spawn(worker_loop(
                    worker_id,
                    ctx,
                    Arc::clone(&work_rx),
                    result_tx.clone(),
                    Arc::clone(&handler),
                ))
            })
            .collect();
        drop(result_tx);

        let mut results = Vec::new();
        while let Some(result) = result_rx.recv().await {
            results.push(result);
        }

        for (worker_id, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(err) = joined {
                error!(worker_id, error = %err, "worker terminated abnormally");
            }
        }

        info!(workers = pool_size, completed = results.len(), "worker pool drained");
        Ok(results)
    }

    /// Contexts are built up front so a broken collaborator fails the run
    /// before any document is touched.
    fn build_contexts(&self, count: usize) -> Result<Vec<PipelineContext>> {
        (0..count)
            .map(|worker_id| {
                (self.context_factory)().map_err(|err| {
                    anyhow::Error::from(PipelineError::config(format!(
                        "failed to initialise worker {worker_id} collaborators: {err:#}"
                    )))
                })
            })
            .collect()
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: PipelineContext,
    work_rx: Arc<Mutex<Receiver<JobDispatch>>>,
    result_tx: Sender<JobResult>,
    handler: Arc<dyn JobHandler>,
) {
    loop {
        let next = { work_rx.lock().await.recv().await };
        let Some(JobDispatch { job }) = next else {
            break;
        };

        debug!(worker_id, file = %job.file_name, "worker picked document");
        let outcome = handler.handle(&ctx, &job).await;
        if result_tx
            .send(JobResult {
                job,
                worker_id,
                outcome,
            })
            .await
            .is_err()
        {
            break;
        }
    }
    debug!(worker_id, "worker finished");
}

#[cfg(test)]
mod tests {
    use std::{
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use anyhow::anyhow;

    use super::*;

    struct SleepyHandler;

    #[async_trait]
    impl JobHandler for SleepyHandler {
        async fn handle(&self, _ctx: &PipelineContext, job: &DocumentJob) -> Result<DocumentOutcome> {
            tokio::time::sleep(Duration::from_millis(5 * (3 - job.index as u64))).await;
            if job.file_name == "bad.docx" {
                return Err(anyhow!("broken container"));
            }
            Ok(DocumentOutcome {
                artifacts: DocumentArtifacts::default(),
                chunk_count: job.index,
            })
        }
    }

    fn jobs(names: &[&str]) -> Vec<DocumentJob> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| DocumentJob {
                index,
                path: PathBuf::from(name),
                file_name: name.to_string(),
                stem: name.to_string(),
            })
            .collect()
    }

    fn factory(built: Arc<AtomicUsize>) -> ContextFactory {
        Arc::new(move || {
            built.fetch_add(1, Ordering::SeqCst);
            PipelineContext::with_defaults(None)
        })
    }

    #[tokio::test]
    async fn every_job_gets_exactly_one_result() -> Result<()> {
        let built = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(2, factory(built.clone()))?;
        let results = scheduler
            .run(jobs(&["a.docx", "bad.docx", "c.docx"]), Arc::new(SleepyHandler))
            .await?;

        assert_eq!(built.load(Ordering::SeqCst), 2);
        let mut seen: Vec<(usize, bool)> = results
            .iter()
            .map(|r| (r.job.index, r.outcome.is_ok()))
            .collect();
        seen.sort();
        assert_eq!(seen, vec![(0, true), (1, false), (2, true)]);
        assert!(results.iter().all(|r| r.worker_id < 2));
        Ok(())
    }

    #[tokio::test]
    async fn broken_collaborators_fail_before_processing() {
        let failing: ContextFactory = Arc::new(|| Err(anyhow!("model missing")));
        let scheduler = Scheduler::new(1, failing).unwrap();
        let err = scheduler
            .run(jobs(&["a.docx"]), Arc::new(SleepyHandler))
            .await
            .err()
            .unwrap();
        assert_eq!(crate::error::error_kind(&err), "configuration");
    }

    #[test]
    fn zero_workers_is_rejected() {
        let built = Arc::new(AtomicUsize::new(0));
        assert!(Scheduler::new(0, factory(built)).is_err());
    }
}
