use serde_json::{Map, Value, json};

use crate::pipeline::types::TaggedChunk;

use super::{ExportSource, position, prune_empty};

pub(super) fn langchain_record(chunk: &TaggedChunk, source: &ExportSource) -> Value {
    let mut metadata = Map::new();
    metadata.insert(
        "source".into(),
        json!(format!("{}#chunk-{}", source.name, chunk.chunk_id)),
    );
    metadata.insert("chunk_id".into(), json!(chunk.chunk_id));
    metadata.insert("file_name".into(), json!(chunk.file_name));
    metadata.insert("chunk_position".into(), position(chunk));
    metadata.insert("word_count".into(), json!(chunk.word_count));
    metadata.insert("keywords".into(), json!(chunk.keywords()));
    metadata.insert("entities".into(), json!(chunk.entities()));
    metadata.insert("policy_keywords".into(), json!(chunk.policy_keywords()));
    metadata.insert("intents".into(), json!(chunk.intents()));
    metadata.insert("error".into(), json!(chunk.error));

    json!({
        "page_content": chunk.content,
        "metadata": Value::Object(prune_empty(metadata)),
    })
}

pub(super) fn llamaindex_record(chunk: &TaggedChunk, source: &ExportSource) -> Value {
    let tags: Vec<&String> = chunk
        .keywords()
        .iter()
        .chain(chunk.policy_keywords())
        .chain(chunk.intents())
        .collect();

    let mut metadata = Map::new();
    metadata.insert("file_name".into(), json!(chunk.file_name));
    metadata.insert("chunk_id".into(), json!(chunk.chunk_id));
    metadata.insert("source".into(), json!(source.name));
    metadata.insert("ingestion_time".into(), json!(source.timestamp));
    metadata.insert("tags".into(), json!(tags));

    json!({
        "text": chunk.content,
        "metadata": Value::Object(prune_empty(metadata)),
    })
}

pub(super) fn haystack_record(chunk: &TaggedChunk, source: &ExportSource) -> Value {
    let mut meta = Map::new();
    meta.insert(
        "name".into(),
        json!(format!("{}_chunk_{}", source.name, chunk.chunk_id)),
    );
    meta.insert("file_name".into(), json!(chunk.file_name));
    meta.insert("chunk_id".into(), json!(chunk.chunk_id));
    meta.insert("intents".into(), json!(chunk.intents()));
    meta.insert("entities".into(), json!(chunk.entity_texts()));
    meta.insert("keywords".into(), json!(chunk.keywords()));

    json!({
        "content": chunk.content,
        "meta": Value::Object(prune_empty(meta)),
    })
}
