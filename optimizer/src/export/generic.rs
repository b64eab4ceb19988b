use serde_json::{Map, Value, json};

use crate::pipeline::types::TaggedChunk;

use super::{ExportSource, prune_empty};

const FIELD_SEPARATOR: &str = "|";

/// Flat record with list fields joined into strings.
pub(super) fn flat_record(chunk: &TaggedChunk, source: &ExportSource) -> Value {
    let mut record = Map::new();
    record.insert(
        "id".into(),
        json!(format!("{}_{}", source.id_prefix, chunk.chunk_id)),
    );
    record.insert("text".into(), json!(chunk.content));
    record.insert("source".into(), json!(source.name));
    record.insert("chunk_id".into(), json!(chunk.chunk_id));
    record.insert("keywords".into(), json!(chunk.keywords().join(FIELD_SEPARATOR)));
    record.insert("intents".into(), json!(chunk.intents().join(FIELD_SEPARATOR)));
    record.insert(
        "entities".into(),
        json!(chunk.entity_texts().join(FIELD_SEPARATOR)),
    );
    Value::Object(prune_empty(record))
}
