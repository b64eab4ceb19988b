use std::sync::Arc;

use anyhow::Result;

use crate::config::OcrConfig;

use super::{
    ner::{EntityRecognizer, RuleBasedRecognizer},
    ocr::{OcrEngine, TesseractEngine},
    tokenizer::{Tokenizer, WordTokenizer},
};

/// Collaborator handles owned by one worker. Built once per worker and
/// passed into every stage instead of living in process globals.
#[derive(Clone)]
pub struct PipelineContext {
    pub tokenizer: Arc<dyn Tokenizer>,
    pub recognizer: Arc<dyn EntityRecognizer>,
    pub ocr: Option<Arc<dyn OcrEngine>>,
}

impl PipelineContext {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        recognizer: Arc<dyn EntityRecognizer>,
        ocr: Option<Arc<dyn OcrEngine>>,
    ) -> Self {
        Self {
            tokenizer,
            recognizer,
            ocr,
        }
    }

    /// Default collaborators; OCR is only wired in when images are requested.
    pub fn with_defaults(ocr_config: Option<&OcrConfig>) -> Result<Self> {
        let ocr = ocr_config.map(|config| {
            Arc::new(TesseractEngine::new(&config.binary, &config.language)) as Arc<dyn OcrEngine>
        });
        Ok(Self::new(
            Arc::new(WordTokenizer::new()),
            Arc::new(RuleBasedRecognizer::new()?),
            ocr,
        ))
    }
}

/// Builds one context per worker.
pub type ContextFactory = Arc<dyn Fn() -> Result<PipelineContext> + Send + Sync>;
