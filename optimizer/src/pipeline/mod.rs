pub mod chunker;
pub mod document_manager;
pub mod docx;
pub mod error_reporter;
pub mod extractor;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod status_service;
pub mod tagger;
pub mod types;

pub mod utils;

pub use chunker::{Chunk, ChunkConfig, Chunker, WordWindowChunker, chunk_text};
pub use document_manager::{
    DocumentManager, FileRepository, FsFileRepository, normalize_extension,
};
pub use docx::{DocxOptions, DocxText, read_docx};
pub use error_reporter::ErrorReporter;
pub use extractor::{DocumentExtractor, DocxExtractor};
pub use pipeline::{Pipeline, PipelineConfig};
pub use report::BatchReport;
pub use scheduler::{DocumentOutcome, JobHandler, Scheduler};
pub use status_service::{DocStage, DocStatusService, DocumentStatus};
pub use tagger::Tagger;
pub use types::{DocumentArtifacts, DocumentJob, ExtractedDocument, ImageStats, TaggedChunk};
pub use utils::{compute_content_hash, normalize_text};
