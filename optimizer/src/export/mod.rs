use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    error::PipelineError,
    pipeline::types::TaggedChunk,
    storage::{write_json_file, write_jsonl_file},
};

pub mod corpus;
mod frameworks;
mod generic;
mod vendor;

pub use corpus::build_corpus;

/// Target schemas. Whether a variant is one object per line or one array
/// per document is fixed by the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    Generic,
    Bedrock,
    #[value(alias = "vendor-a")]
    NovaPro,
    #[value(alias = "vendor-b")]
    ClaudeSonnet,
    #[value(alias = "framework-a")]
    Langchain,
    #[value(alias = "framework-b")]
    Llamaindex,
    #[value(alias = "framework-c")]
    Haystack,
}

impl ExportFormat {
    pub fn is_line_oriented(self) -> bool {
        matches!(
            self,
            Self::Generic | Self::Bedrock | Self::NovaPro | Self::ClaudeSonnet
        )
    }

    pub fn extension(self) -> &'static str {
        if self.is_line_oriented() { "jsonl" } else { "json" }
    }

    /// Directory under `llm/` and prefix of the corpus file.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Bedrock => "bedrock",
            Self::NovaPro => "nova_pro",
            Self::ClaudeSonnet => "claude_sonnet",
            Self::Langchain => "langchain",
            Self::Llamaindex => "llamaindex",
            Self::Haystack => "haystack",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Provenance shared by every record of one export call.
#[derive(Debug, Clone)]
pub struct ExportSource {
    /// Source document name as written into records.
    pub name: String,
    /// Prefix for flat record ids; unique within a run.
    pub id_prefix: String,
    /// UTC ISO-8601, taken once per export.
    pub timestamp: String,
}

impl ExportSource {
    pub fn new(name: impl Into<String>, id_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_prefix: id_prefix.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

pub fn build_records(
    format: ExportFormat,
    chunks: &[TaggedChunk],
    source: &ExportSource,
) -> Vec<Value> {
    chunks
        .iter()
        .map(|chunk| match format {
            ExportFormat::Generic => generic::flat_record(chunk, source),
            ExportFormat::Bedrock => vendor::bedrock_record(chunk, source),
            ExportFormat::NovaPro => vendor::nova_pro_record(chunk, source),
            ExportFormat::ClaudeSonnet => vendor::claude_sonnet_record(chunk, source),
            ExportFormat::Langchain => frameworks::langchain_record(chunk, source),
            ExportFormat::Llamaindex => frameworks::llamaindex_record(chunk, source),
            ExportFormat::Haystack => frameworks::haystack_record(chunk, source),
        })
        .collect()
}

/// Writes one document's export artifact to `destination`.
pub async fn export(
    format: ExportFormat,
    chunks: &[TaggedChunk],
    destination: &Path,
    source: &ExportSource,
) -> Result<PathBuf> {
    let records = build_records(format, chunks, source);

    let written = if format.is_line_oriented() {
        write_jsonl_file(destination, &records).await
    } else {
        write_json_file(destination, &records).await
    };
    written.map_err(|err| PipelineError::export(destination, format!("{err:#}")))?;

    debug!(
        format = %format,
        path = %destination.display(),
        records = records.len(),
        "export written"
    );
    Ok(destination.to_path_buf())
}

/// Drops keys whose value is null, an empty string, array or object.
pub fn prune_empty(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter().filter(|(_, value)| !is_empty_value(value)).collect()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub(crate) fn position(chunk: &TaggedChunk) -> Value {
    chunk
        .chunk_position
        .map(|p| Value::from(round3(p)))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn prune_drops_only_empty_values() {
        let map = json!({
            "a": [],
            "b": {},
            "c": "",
            "d": null,
            "e": 0,
            "f": false,
            "g": ["x"],
        });
        let Value::Object(map) = map else { unreachable!() };
        let pruned = prune_empty(map);
        let keys: Vec<&str> = pruned.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["e", "f", "g"]);
    }

    #[test]
    fn positions_round_to_three_places() {
        assert_eq!(round3(1.0 / 3.0), 0.333);
        assert_eq!(round3(0.6666), 0.667);
        assert_eq!(round3(0.0), 0.0);
    }

    #[test]
    fn aliases_resolve_to_variants() {
        assert_eq!(
            ExportFormat::from_str("vendor-a", true).unwrap(),
            ExportFormat::NovaPro
        );
        assert_eq!(
            ExportFormat::from_str("framework-c", true).unwrap(),
            ExportFormat::Haystack
        );
        assert!(ExportFormat::Bedrock.is_line_oriented());
        assert_eq!(ExportFormat::Langchain.extension(), "json");
    }
}
