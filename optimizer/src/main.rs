use std::{path::PathBuf, process::ExitCode, sync::Arc, thread};

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rag_optimizer::{
    ExportFormat, Pipeline, PipelineConfig,
    config::load_config,
    error::error_kind,
    pipeline::{ChunkConfig, DocxOptions},
};

/// Turns office documents into tagged, overlapping chunks for RAG ingestion.
#[derive(Debug, Parser)]
#[command(name = "rag-optimizer", version, about)]
struct Cli {
    /// Directory searched recursively for input documents.
    #[arg(long, env = "OPTIMIZER_INPUT_DIR")]
    input_dir: PathBuf,

    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Words per chunk; defaults to the config file value.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Words shared by consecutive chunks; must be below the chunk size.
    #[arg(long)]
    overlap: Option<usize>,

    /// Run OCR over embedded images and inline the recognised text.
    #[arg(long)]
    ocr_images: bool,

    #[arg(long, value_enum, default_value_t = ExportFormat::Generic)]
    export_format: ExportFormat,

    /// Parallel document workers; defaults to the available cores.
    #[arg(long)]
    workers: Option<usize>,

    /// Also render each JSON artifact as a PDF.
    #[arg(long)]
    pdf: bool,

    /// Leave tables out of the extracted text.
    #[arg(long)]
    skip_tables: bool,

    /// Skip concatenating line-oriented exports into one corpus file.
    #[arg(long)]
    no_corpus: bool,

    /// YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    dotenv().ok();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(kind = error_kind(&err), error = %err, "batch run failed");
            for (depth, cause) in err.chain().skip(1).enumerate() {
                error!(cause_depth = depth + 1, cause = %cause, "caused by");
            }
            eprintln!("rag-optimizer failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let app = load_config(cli.config.as_deref()).await?;

    let workers = cli.workers.unwrap_or_else(|| {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });

    let mut config = PipelineConfig::new(&cli.input_dir, &cli.output_dir);
    config.chunk = ChunkConfig::new(
        cli.chunk_size.unwrap_or(app.chunking.chunk_size),
        cli.overlap.unwrap_or(app.chunking.overlap),
    );
    config.export_format = cli.export_format;
    config.workers = workers;
    config.docx = DocxOptions {
        include_tables: app.ingestion.include_tables && !cli.skip_tables,
        ocr_images: cli.ocr_images,
    };
    config.render_pdf = cli.pdf;
    config.build_corpus = !cli.no_corpus;

    info!(
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        chunk_size = config.chunk.chunk_size,
        overlap = config.chunk.overlap,
        format = %config.export_format,
        workers,
        ocr = config.docx.ocr_images,
        "starting batch"
    );

    let pipeline = Arc::new(Pipeline::new(config, &app).context("failed to set up pipeline")?);
    let report = pipeline.run_batch().await?;

    if report.failed > 0 {
        info!(
            failed = report.failed,
            total = report.total(),
            "some documents failed, see the batch report"
        );
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
