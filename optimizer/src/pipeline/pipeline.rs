use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    config::{AppConfig, OcrConfig},
    error::PipelineError,
    export::{self, ExportFormat, ExportSource, build_corpus},
    nlp::{ContextFactory, PipelineContext, TesseractEngine},
    render::{title_for, write_json_pdf},
    storage::write_json_file,
};

use super::{
    chunker::{ChunkConfig, Chunker, WordWindowChunker},
    docx::DocxOptions,
    document_manager::DocumentManager,
    error_reporter::ErrorReporter,
    extractor::{DocumentExtractor, DocxExtractor},
    report::BatchReport,
    scheduler::{DocumentOutcome, JobHandler, Scheduler},
    status_service::{DocStage, DocStatusService},
    tagger::Tagger,
    types::{DocumentArtifacts, DocumentJob, TaggedChunk},
    utils::normalize_text,
};

const JSON_DIR: &str = "json";
const PDF_DIR: &str = "pdf";
const LLM_DIR: &str = "llm";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub chunk: ChunkConfig,
    pub export_format: ExportFormat,
    pub workers: usize,
    pub docx: DocxOptions,
    pub render_pdf: bool,
    pub build_corpus: bool,
}

impl PipelineConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            chunk: ChunkConfig::default(),
            export_format: ExportFormat::Generic,
            workers: 1,
            docx: DocxOptions::default(),
            render_pdf: false,
            build_corpus: true,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.chunk.validate()?;
        if self.workers == 0 {
            return Err(PipelineError::config("workers must be greater than zero"));
        }
        Ok(())
    }

    fn json_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(JSON_DIR).join(format!("{stem}.json"))
    }

    fn pdf_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join(PDF_DIR).join(format!("{stem}.pdf"))
    }

    fn export_path(&self, stem: &str) -> PathBuf {
        self.output_dir
            .join(LLM_DIR)
            .join(self.export_format.dir_name())
            .join(format!("{stem}.{}", self.export_format.extension()))
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    doc_manager: DocumentManager,
    chunker: Arc<dyn Chunker>,
    extractor: Arc<dyn DocumentExtractor>,
    tagger: Tagger,
    context_factory: ContextFactory,
    status_service: DocStatusService,
    error_reporter: ErrorReporter,
}

impl Pipeline {
    /// Wires the default collaborators. Fails with a configuration error
    /// when the run could not start.
    pub fn new(config: PipelineConfig, app: &AppConfig) -> Result<Self> {
        config.validate()?;
        app.validate()?;

        let doc_manager = DocumentManager::new(&config.input_dir, &app.ingestion.extensions)?;
        let extractor = Arc::new(DocxExtractor::new(doc_manager.file_repo(), config.docx));
        let tagger = Tagger::new(Arc::new(app.tagging.clone().normalized()));

        let ocr: Option<OcrConfig> = config.docx.ocr_images.then(|| app.ocr.clone());
        if let Some(ocr) = ocr.as_ref() {
            if !TesseractEngine::new(&ocr.binary, &ocr.language).is_available() {
                return Err(PipelineError::config(format!(
                    "image ocr requested but {} is not runnable",
                    ocr.binary.display()
                ))
                .into());
            }
        }
        let context_factory: ContextFactory =
            Arc::new(move || PipelineContext::with_defaults(ocr.as_ref()));

        Ok(Self::with_dependencies(
            config,
            doc_manager,
            Arc::new(WordWindowChunker::new()),
            extractor,
            tagger,
            context_factory,
        ))
    }

    pub fn with_dependencies(
        config: PipelineConfig,
        doc_manager: DocumentManager,
        chunker: Arc<dyn Chunker>,
        extractor: Arc<dyn DocumentExtractor>,
        tagger: Tagger,
        context_factory: ContextFactory,
    ) -> Self {
        let status_service = DocStatusService::new();
        let error_reporter = ErrorReporter::new(status_service.clone());
        Self {
            config,
            doc_manager,
            chunker,
            extractor,
            tagger,
            context_factory,
            status_service,
            error_reporter,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn document_manager(&self) -> &DocumentManager {
        &self.doc_manager
    }

    pub fn status_service(&self) -> &DocStatusService {
        &self.status_service
    }

    /// Processes every discovered document and writes the corpus and the
    /// batch report. Per-document failures are recorded, not returned.
    pub async fn run_batch(self: Arc<Self>) -> Result<BatchReport> {
        let started_at = Utc::now();
        self.config.validate()?;

        let jobs = self
            .doc_manager
            .discover()
            .context("failed to discover input documents")?;
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to create output directory {}",
                    self.config.output_dir.display()
                )
            })?;

        if jobs.is_empty() {
            warn!(input_dir = %self.config.input_dir.display(), "no documents to process");
        }
        self.status_service.register(&jobs).await;

        let scheduler = Scheduler::new(self.config.workers, Arc::clone(&self.context_factory))?;
        let handler: Arc<dyn JobHandler> = self.clone();
        let results = scheduler.run(jobs.clone(), handler).await?;

        let mut outcomes: HashMap<usize, DocumentOutcome> = HashMap::new();
        for result in results {
            debug!(
                worker_id = result.worker_id,
                file = %result.job.file_name,
                ok = result.outcome.is_ok(),
                "document result collected"
            );
            match result.outcome {
                Ok(outcome) => {
                    outcomes.insert(result.job.index, outcome);
                }
                Err(err) => self.report_failure(&result.job, &err).await,
            }
        }

        for job in &jobs {
            if !outcomes.contains_key(&job.index)
                && self
                    .status_service
                    .get(job.index)
                    .await
                    .is_some_and(|status| !status.stage.is_terminal())
            {
                let err = anyhow!("worker stopped before reporting a result");
                self.report_failure(job, &err).await;
            }
        }

        let corpus = if self.config.build_corpus {
            let ordered: Vec<PathBuf> = jobs
                .iter()
                .filter_map(|job| outcomes.get(&job.index))
                .map(|outcome| outcome.artifacts.export.clone())
                .collect();
            build_corpus(&self.config.output_dir, self.config.export_format, &ordered)
                .await
                .context("failed to assemble corpus")?
        } else {
            None
        };

        let report = BatchReport::new(
            started_at,
            self.config.export_format,
            &self.config.input_dir,
            &self.config.output_dir,
            self.status_service.snapshot().await,
            corpus,
        );
        let report_path = report
            .persist()
            .await
            .context("failed to write batch report")?;

        info!(
            documents = report.total(),
            succeeded = report.succeeded,
            failed = report.failed,
            failures_logged = self.error_reporter.failure_count(),
            report = %report_path.display(),
            "batch finished"
        );
        Ok(report)
    }

    async fn report_failure(&self, job: &DocumentJob, err: &anyhow::Error) {
        if let Err(status_err) = self.error_reporter.record(job, err).await {
            warn!(file = %job.file_name, error = %status_err, "failed to record document failure");
        }
    }

    /// Runs one document through every stage using the worker's context.
    pub async fn process_document(
        &self,
        ctx: &PipelineContext,
        job: &DocumentJob,
    ) -> Result<DocumentOutcome> {
        let index = job.index;

        let extracted = self
            .extractor
            .extract(&job.path, ctx)
            .await
            .with_context(|| format!("failed to extract {}", job.file_name))?;
        self.status_service.advance(index, DocStage::Ingested).await?;
        let (hash, images) = (extracted.content_hash.clone(), extracted.images);
        self.status_service
            .annotate(index, |status| {
                status.content_hash = Some(hash);
                status.images = images;
            })
            .await?;

        let cleaned = normalize_text(&extracted.text);
        self.status_service.advance(index, DocStage::Normalized).await?;

        let chunks: Vec<String> = self
            .chunker
            .chunk(&cleaned, &self.config.chunk)?
            .into_iter()
            .map(|chunk| chunk.content)
            .collect();
        if chunks.is_empty() {
            warn!(file = %job.file_name, "no text extracted from document");
        }
        self.status_service.advance(index, DocStage::Chunked).await?;

        let tagged = self.tag(ctx, chunks, &job.file_name).await?;
        let degraded = tagged.iter().filter(|c| c.is_degraded()).count();
        let chunk_count = tagged.len();
        self.status_service
            .annotate(index, |status| {
                status.chunk_count = chunk_count;
                status.degraded_chunks = degraded;
            })
            .await?;
        self.status_service.advance(index, DocStage::Tagged).await?;

        let artifacts = self.write_artifacts(job, &tagged).await?;
        self.status_service.advance(index, DocStage::Exported).await?;

        let recorded = artifacts.clone();
        self.status_service
            .annotate(index, |status| status.artifacts = Some(recorded))
            .await?;
        self.status_service.advance(index, DocStage::Done).await?;

        info!(
            file = %job.file_name,
            chunks = chunk_count,
            degraded,
            export = %artifacts.export.display(),
            "document processed"
        );
        Ok(DocumentOutcome {
            artifacts,
            chunk_count,
        })
    }

    async fn tag(
        &self,
        ctx: &PipelineContext,
        chunks: Vec<String>,
        file_name: &str,
    ) -> Result<Vec<TaggedChunk>> {
        let tagger = self.tagger.clone();
        let ctx = ctx.clone();
        let file_name = file_name.to_string();
        tokio::task::spawn_blocking(move || tagger.tag_chunks(&ctx, &chunks, &file_name))
            .await
            .context("tagging task panicked")
    }

    async fn write_artifacts(
        &self,
        job: &DocumentJob,
        tagged: &[TaggedChunk],
    ) -> Result<DocumentArtifacts> {
        let json_path = self.config.json_path(&job.stem);
        write_json_file(&json_path, tagged)
            .await
            .map_err(|err| PipelineError::export(&json_path, format!("{err:#}")))?;

        let pdf = if self.config.render_pdf {
            self.render_pdf(job, tagged, &json_path).await
        } else {
            None
        };

        let source = ExportSource::new(job.file_name.clone(), job.stem.clone());
        let export_path = export::export(
            self.config.export_format,
            tagged,
            &self.config.export_path(&job.stem),
            &source,
        )
        .await?;

        Ok(DocumentArtifacts {
            json: json_path,
            export: export_path,
            pdf,
        })
    }

    /// The PDF is a debug view of the JSON artifact; failing to render it
    /// leaves the document intact.
    async fn render_pdf(
        &self,
        job: &DocumentJob,
        tagged: &[TaggedChunk],
        json_path: &Path,
    ) -> Option<PathBuf> {
        let rendered = match serde_json::to_string_pretty(tagged) {
            Ok(pretty) => {
                write_json_pdf(pretty, title_for(json_path), self.config.pdf_path(&job.stem)).await
            }
            Err(err) => Err(err.into()),
        };
        match rendered {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(file = %job.file_name, error = %format!("{err:#}"), "pdf rendering failed");
                None
            }
        }
    }
}

#[async_trait]
impl JobHandler for Pipeline {
    async fn handle(&self, ctx: &PipelineContext, job: &DocumentJob) -> Result<DocumentOutcome> {
        self.process_document(ctx, job).await
    }
}
