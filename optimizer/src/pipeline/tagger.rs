use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use tracing::{debug, warn};

use crate::{
    config::TaggingConfig,
    error::PipelineError,
    nlp::{PipelineContext, tokenizer::is_alphanumeric_token},
};

use super::types::TaggedChunk;

pub const DEFAULT_INTENT: &str = "general";

/// Annotates chunks using the collaborators of the calling worker. The
/// vocabulary is shared read-only between all workers.
#[derive(Debug, Clone)]
pub struct Tagger {
    config: Arc<TaggingConfig>,
}

impl Tagger {
    pub fn new(config: Arc<TaggingConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TaggingConfig {
        &self.config
    }

    /// One record per chunk, in order. A chunk whose tagging fails is
    /// returned in degraded form and does not affect its siblings.
    pub fn tag_chunks(
        &self,
        ctx: &PipelineContext,
        chunks: &[String],
        file_name: &str,
    ) -> Vec<TaggedChunk> {
        if chunks.is_empty() {
            return Vec::new();
        }

        let total = chunks.len();
        let tagged: Vec<TaggedChunk> = chunks
            .iter()
            .enumerate()
            .map(|(chunk_id, content)| {
                match self.tag_chunk(ctx, chunk_id, total, content, file_name) {
                    Ok(record) => record,
                    Err(err) => {
                        let err = PipelineError::ChunkTagging {
                            chunk_id,
                            reason: format!("{err:#}"),
                        };
                        warn!(file = %file_name, chunk_id, error = %err, "chunk tagging degraded");
                        TaggedChunk::degraded(chunk_id, file_name, content, err.to_string())
                    }
                }
            })
            .collect();

        debug!(
            file = %file_name,
            chunks = total,
            degraded = tagged.iter().filter(|c| c.is_degraded()).count(),
            "tagged chunks"
        );
        tagged
    }

    fn tag_chunk(
        &self,
        ctx: &PipelineContext,
        chunk_id: usize,
        total: usize,
        content: &str,
        file_name: &str,
    ) -> Result<TaggedChunk> {
        let lowered = content.to_lowercase();
        let tokens = ctx.tokenizer.tokenize(&lowered)?;

        let keywords = self.rank_keywords(ctx, &tokens);
        let policy_keywords = self.match_policy_terms(&tokens);
        let entities = ctx.recognizer.recognize(content)?;
        let intents = self.classify_intents(&lowered);

        Ok(TaggedChunk {
            chunk_id,
            file_name: file_name.to_string(),
            content: content.to_string(),
            word_count: Some(tokens.len()),
            keywords: Some(keywords),
            entities: Some(entities),
            policy_keywords: Some(policy_keywords),
            intents: Some(intents),
            chunk_position: Some(chunk_id as f64 / total as f64),
            error: None,
        })
    }

    /// Most frequent alphanumeric non-stopword tokens; equal counts keep
    /// first-occurrence order.
    fn rank_keywords(&self, ctx: &PipelineContext, tokens: &[String]) -> Vec<String> {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (position, token) in tokens.iter().enumerate() {
            if !is_alphanumeric_token(token) || ctx.tokenizer.is_stopword(token) {
                continue;
            }
            counts.entry(token.as_str()).or_insert((0, position)).0 += 1;
        }

        let mut ranked: Vec<(&str, usize, usize)> = counts
            .into_iter()
            .map(|(token, (count, first))| (token, count, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked
            .into_iter()
            .take(self.config.max_keywords)
            .map(|(token, ..)| token.to_string())
            .collect()
    }

    fn match_policy_terms(&self, tokens: &[String]) -> Vec<String> {
        let mut matches: Vec<String> = Vec::new();
        for token in tokens {
            if self.config.policy_keywords.iter().any(|k| k == token)
                && !matches.iter().any(|m| m == token)
            {
                matches.push(token.clone());
            }
        }
        matches
    }

    fn classify_intents(&self, lowered: &str) -> Vec<String> {
        let intents: Vec<String> = self
            .config
            .intents
            .iter()
            .filter(|rule| rule.triggers.iter().any(|t| lowered.contains(t.as_str())))
            .map(|rule| rule.label.clone())
            .collect();

        if intents.is_empty() {
            vec![DEFAULT_INTENT.to_string()]
        } else {
            intents
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagger() -> Tagger {
        Tagger::new(Arc::new(TaggingConfig::default().normalized()))
    }

    fn ctx() -> PipelineContext {
        PipelineContext::with_defaults(None).unwrap()
    }

    #[test]
    fn keywords_rank_by_count_then_first_occurrence() {
        let tagged = tagger().tag_chunks(
            &ctx(),
            &["Alpha beta gamma beta delta gamma epsilon zeta beta".to_string()],
            "doc.docx",
        );
        assert_eq!(
            tagged[0].keywords(),
            ["beta", "gamma", "alpha", "delta", "epsilon"]
        );
    }

    #[test]
    fn positions_divide_by_total() {
        let chunks: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let tagged = tagger().tag_chunks(&ctx(), &chunks, "doc.docx");
        let positions: Vec<f64> = tagged.iter().map(|c| c.chunk_position.unwrap()).collect();
        assert_eq!(positions, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn unmatched_text_falls_back_to_general() {
        let tagged = tagger().tag_chunks(&ctx(), &["Blue skies today".to_string()], "doc.docx");
        assert_eq!(tagged[0].intents(), [DEFAULT_INTENT]);
        assert!(tagged[0].policy_keywords().is_empty());
    }

    #[test]
    fn policy_terms_are_deduplicated_in_order() {
        let tagged = tagger().tag_chunks(
            &ctx(),
            &["Privacy policy: the policy covers PRIVACY and data.".to_string()],
            "doc.docx",
        );
        assert_eq!(tagged[0].policy_keywords(), ["privacy", "policy", "data"]);
    }
}
