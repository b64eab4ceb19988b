use anyhow::Result;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub order: usize,
    pub content: String,
    pub word_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 100,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.chunk_size == 0 {
            return Err(PipelineError::config("chunk_size must be greater than zero"));
        }
        if self.overlap >= self.chunk_size {
            return Err(PipelineError::config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

pub trait Chunker: Send + Sync {
    fn chunk(&self, content: &str, config: &ChunkConfig) -> Result<Vec<Chunk>>;
}

/// Sliding window over whitespace separated words.
#[derive(Debug, Default, Clone)]
pub struct WordWindowChunker;

impl WordWindowChunker {
    pub fn new() -> Self {
        Self
    }
}

impl Chunker for WordWindowChunker {
    fn chunk(&self, content: &str, config: &ChunkConfig) -> Result<Vec<Chunk>> {
        config.validate()?;

        let words: Vec<&str> = content.split_whitespace().collect();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < words.len() {
            let end = (start + config.chunk_size).min(words.len());
            chunks.push(Chunk {
                order: chunks.len(),
                content: words[start..end].join(" "),
                word_count: end - start,
            });

            if end == words.len() {
                break;
            }
            start += config.step();
        }

        Ok(chunks)
    }
}

/// Convenience wrapper returning just the chunk strings.
pub fn chunk_text(content: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    let chunks = WordWindowChunker.chunk(content, &ChunkConfig::new(chunk_size, overlap))?;
    Ok(chunks.into_iter().map(|chunk| chunk.content).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_kind;

    #[test]
    fn overlapping_windows_stop_at_the_end() {
        let chunks = chunk_text("one two three four five", 3, 1).unwrap();
        assert_eq!(chunks, vec!["one two three", "three four five"]);
    }

    #[test]
    fn short_text_yields_one_chunk_and_empty_yields_none() {
        assert_eq!(chunk_text("a b", 10, 2).unwrap(), vec!["a b"]);
        assert!(chunk_text("   \n ", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn trailing_window_is_kept_when_short() {
        let chunks = chunk_text("a b c d e f g", 3, 0).unwrap();
        assert_eq!(chunks, vec!["a b c", "d e f", "g"]);
    }

    #[test]
    fn overlap_not_below_size_is_a_configuration_error() {
        let err = chunk_text("a b c", 3, 3).unwrap_err();
        assert_eq!(error_kind(&err), "configuration");
        let err = chunk_text("a b c", 0, 0).unwrap_err();
        assert_eq!(error_kind(&err), "configuration");
    }

    #[test]
    fn orders_are_contiguous() {
        let chunks = WordWindowChunker
            .chunk("w1 w2 w3 w4 w5 w6 w7 w8 w9", &ChunkConfig::new(4, 2))
            .unwrap();
        let orders: Vec<usize> = chunks.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
        assert_eq!(chunks.last().unwrap().content, "w7 w8 w9");
    }
}
