use serde_json::{Map, Value, json};

use crate::pipeline::{docx::IMAGE_MARKER_PREFIX, types::TaggedChunk};

use super::{ExportSource, position, prune_empty};

const PROCEDURE_INTENT: &str = "procedure";

/// `{text, metadata}` with the shared provenance fields; variants extend
/// the metadata before pruning.
fn base_metadata(chunk: &TaggedChunk, source: &ExportSource) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("source".into(), json!(source.name));
    metadata.insert("file_name".into(), json!(chunk.file_name));
    metadata.insert("chunk_id".into(), json!(chunk.chunk_id));
    metadata.insert("chunk_position".into(), position(chunk));
    metadata.insert("word_count".into(), json!(chunk.word_count));
    metadata.insert("keywords".into(), json!(chunk.keywords()));
    metadata.insert("policy_keywords".into(), json!(chunk.policy_keywords()));
    metadata.insert("intents".into(), json!(chunk.intents()));
    metadata.insert("entities".into(), json!(chunk.entities()));
    metadata.insert("ingestion_timestamp".into(), json!(source.timestamp));
    metadata
}

fn entry(chunk: &TaggedChunk, metadata: Map<String, Value>) -> Value {
    json!({
        "text": chunk.content,
        "metadata": Value::Object(prune_empty(metadata)),
    })
}

pub(super) fn bedrock_record(chunk: &TaggedChunk, source: &ExportSource) -> Value {
    entry(chunk, base_metadata(chunk, source))
}

pub(super) fn nova_pro_record(chunk: &TaggedChunk, source: &ExportSource) -> Value {
    let multimodal_type = if chunk.content.contains(IMAGE_MARKER_PREFIX) {
        "text/image"
    } else {
        "text"
    };

    let mut metadata = base_metadata(chunk, source);
    metadata.insert("multimodal_type".into(), json!(multimodal_type));
    metadata.insert("content_modality".into(), json!("structured"));
    entry(chunk, metadata)
}

pub(super) fn claude_sonnet_record(chunk: &TaggedChunk, source: &ExportSource) -> Value {
    let hint = if chunk.intents().iter().any(|i| i == PROCEDURE_INTENT) {
        "multi-step"
    } else {
        "contextual"
    };
    let mut contextual_tags = chunk.entity_texts();
    contextual_tags.extend(chunk.policy_keywords().iter().cloned());

    let mut metadata = base_metadata(chunk, source);
    metadata.insert("reasoning_hints".into(), json!([hint]));
    metadata.insert("contextual_tags".into(), json!(contextual_tags));
    entry(chunk, metadata)
}
