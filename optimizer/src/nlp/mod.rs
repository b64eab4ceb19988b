pub mod context;
pub mod ner;
pub mod ocr;
pub mod tokenizer;

pub use context::{ContextFactory, PipelineContext};
pub use ner::{Entity, EntityRecognizer, RuleBasedRecognizer};
pub use ocr::{OcrEngine, PreparedImage, TesseractEngine, prepare_image, recognize_with_fallback};
pub use tokenizer::{Tokenizer, WordTokenizer};
