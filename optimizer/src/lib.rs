pub mod config;
pub mod error;
pub mod export;
pub mod nlp;
pub mod pipeline;
pub mod render;
pub mod storage;

pub use config::AppConfig;
pub use error::PipelineError;
pub use export::ExportFormat;
pub use pipeline::{BatchReport, Pipeline, PipelineConfig};
