use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::nlp::Entity;

/// One chunk plus its tags. Tag fields are optional so that a chunk whose
/// tagging failed keeps only `chunk_id`, `file_name`, `content` and `error`;
/// readers go through the accessors, which substitute empty values.
#[derive(Default, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaggedChunk {
    pub chunk_id: usize,
    pub file_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Entity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_position: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaggedChunk {
    pub fn degraded(chunk_id: usize, file_name: &str, content: &str, error: String) -> Self {
        Self {
            chunk_id,
            file_name: file_name.to_string(),
            content: content.to_string(),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn keywords(&self) -> &[String] {
        self.keywords.as_deref().unwrap_or_default()
    }

    pub fn entities(&self) -> &[Entity] {
        self.entities.as_deref().unwrap_or_default()
    }

    pub fn policy_keywords(&self) -> &[String] {
        self.policy_keywords.as_deref().unwrap_or_default()
    }

    pub fn intents(&self) -> &[String] {
        self.intents.as_deref().unwrap_or_default()
    }

    pub fn entity_texts(&self) -> Vec<String> {
        self.entities().iter().map(|e| e.text.clone()).collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// A discovered input document. `index` is its discovery position and
/// fixes its place in the corpus regardless of completion order.
#[derive(Clone, Debug)]
pub struct DocumentJob {
    pub index: usize,
    pub path: PathBuf,
    pub file_name: String,
    /// Base name for every artifact; unique within a run.
    pub stem: String,
}

/// What the extractor hands to the rest of the pipeline.
#[derive(Clone, Debug, Default)]
pub struct ExtractedDocument {
    pub text: String,
    pub content_hash: String,
    pub images: ImageStats,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStats {
    pub seen: usize,
    pub recognized: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DocumentArtifacts {
    pub json: PathBuf,
    pub export: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<PathBuf>,
}
