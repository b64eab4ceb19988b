use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::error::PipelineError;

pub const DEFAULT_CONFIG_PATH: &str = "config/optimizer.yaml";
pub const CONFIG_PATH_ENV: &str = "OPTIMIZER_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chunking: ChunkingConfig,
    pub ingestion: IngestionConfig,
    pub ocr: OcrConfig,
    pub tagging: TaggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub extensions: Vec<String>,
    pub include_tables: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            extensions: vec![".docx".to_string()],
            include_tables: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub binary: PathBuf,
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: "eng".to_string(),
        }
    }
}

/// Read-only vocabulary shared by every worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub max_keywords: usize,
    pub policy_keywords: Vec<String>,
    pub intents: Vec<IntentRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntentRule {
    pub label: String,
    pub triggers: Vec<String>,
}

impl IntentRule {
    pub fn new(label: &str, triggers: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Default for TaggingConfig {
    fn default() -> Self {
        let policy_keywords = [
            "policy",
            "policies",
            "compliance",
            "comply",
            "compliant",
            "regulation",
            "regulations",
            "regulatory",
            "gdpr",
            "hipaa",
            "privacy",
            "confidential",
            "confidentiality",
            "security",
            "audit",
            "consent",
            "retention",
            "breach",
            "data",
            "protection",
            "governance",
            "risk",
            "legal",
            "violation",
            "disciplinary",
        ];

        Self {
            max_keywords: 5,
            policy_keywords: policy_keywords.iter().map(|k| k.to_string()).collect(),
            intents: vec![
                IntentRule::new(
                    "rule",
                    &[
                        "must",
                        "shall",
                        "required",
                        "mandatory",
                        "prohibited",
                        "not permitted",
                        "not allowed",
                    ],
                ),
                IntentRule::new(
                    "procedure",
                    &[
                        "step",
                        "procedure",
                        "process",
                        "how to",
                        "follow these",
                        "submit",
                    ],
                ),
                IntentRule::new(
                    "definition",
                    &["means", "is defined as", "refers to", "definition"],
                ),
                IntentRule::new(
                    "responsibility",
                    &["responsible for", "accountable", "owner", "duties"],
                ),
                IntentRule::new(
                    "deadline",
                    &["deadline", "due date", "within", "no later than"],
                ),
                IntentRule::new("contact", &["contact", "email", "phone", "reach out"]),
            ],
        }
    }
}

impl TaggingConfig {
    /// Lowercases the vocabulary once so workers can match case-folded tokens.
    pub fn normalized(mut self) -> Self {
        self.policy_keywords = self
            .policy_keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        for intent in &mut self.intents {
            intent.triggers = intent
                .triggers
                .iter()
                .map(|t| t.to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
        }
        self
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.tagging.max_keywords == 0 {
            return Err(PipelineError::config("tagging.max_keywords must be at least 1"));
        }
        if self.ingestion.extensions.is_empty() {
            return Err(PipelineError::config(
                "ingestion.extensions must list at least one extension",
            ));
        }
        if let Some(intent) = self
            .tagging
            .intents
            .iter()
            .find(|intent| intent.label.trim().is_empty())
        {
            return Err(PipelineError::config(format!(
                "intent with triggers {:?} has an empty label",
                intent.triggers
            )));
        }
        Ok(())
    }
}

/// Loads the YAML config. An explicitly requested file must exist; the
/// default location falls back to built-in values.
pub async fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match env::var(CONFIG_PATH_ENV) {
            Ok(value) if !value.trim().is_empty() => (PathBuf::from(value), true),
            _ => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        },
    };

    let contents = match fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
            warn!(path = %path.display(), "config file not found, using built-in defaults");
            return Ok(AppConfig::default());
        }
        Err(err) => {
            return Err(PipelineError::config(format!(
                "failed to read config file at {}: {err}",
                path.display()
            )))
            .context("failed to load configuration");
        }
    };

    let config: AppConfig = serde_yaml::from_str(&contents)
        .map_err(|err| {
            PipelineError::config(format!(
                "failed to parse config file at {}: {err}",
                path.display()
            ))
        })
        .context("failed to load configuration")?;
    config.validate()?;
    info!(path = %path.display(), "configuration loaded from disk");
    Ok(config)
}
