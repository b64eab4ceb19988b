use std::collections::HashSet;

use anyhow::Result;
use unicode_segmentation::UnicodeSegmentation;

/// English stopwords, same coverage as the NLTK corpus list.
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't",
];

pub trait Tokenizer: Send + Sync {
    /// Splits text into word and punctuation tokens, preserving order.
    fn tokenize(&self, text: &str) -> Result<Vec<String>>;

    /// Expects an already case-folded token.
    fn is_stopword(&self, token: &str) -> bool;
}

/// Contractions split off the preceding word, Treebank style.
const CLITICS: &[&str] = &["n't", "'s", "'m", "'d", "'ll", "'re", "'ve"];

#[derive(Debug, Clone)]
pub struct WordTokenizer {
    stopwords: HashSet<&'static str>,
    clitics: Vec<String>,
}

impl WordTokenizer {
    pub fn new() -> Self {
        Self::with_stopwords(ENGLISH_STOPWORDS)
    }

    pub fn with_stopwords(stopwords: &[&'static str]) -> Self {
        let clitics = CLITICS
            .iter()
            .flat_map(|clitic| [clitic.to_string(), clitic.replace('\'', "\u{2019}")])
            .collect();
        Self {
            stopwords: stopwords.iter().copied().collect(),
            clitics,
        }
    }

    /// `policy's` becomes `policy` + `'s`, `isn't` becomes `is` + `n't`.
    fn split_clitic<'a>(&self, word: &'a str) -> (&'a str, Option<&'a str>) {
        for clitic in &self.clitics {
            if word.len() <= clitic.len() {
                continue;
            }
            let at = word.len() - clitic.len();
            if let (Some(stem), Some(suffix)) = (word.get(..at), word.get(at..)) {
                if suffix.eq_ignore_ascii_case(clitic) {
                    return (stem, Some(suffix));
                }
            }
        }
        (word, None)
    }
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let mut tokens = Vec::new();
        for segment in text.split_word_bounds() {
            if segment.trim().is_empty() {
                continue;
            }
            match self.split_clitic(segment) {
                (stem, Some(clitic)) => {
                    tokens.push(stem.to_string());
                    tokens.push(clitic.to_string());
                }
                (word, None) => tokens.push(word.to_string()),
            }
        }
        Ok(tokens)
    }

    fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }
}

pub fn is_alphanumeric_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_becomes_its_own_token() {
        let tokens = WordTokenizer::new()
            .tokenize("Comply with the policy.")
            .unwrap();
        assert_eq!(tokens, vec!["Comply", "with", "the", "policy", "."]);
    }

    #[test]
    fn contractions_and_possessives_split_off() {
        let tokens = WordTokenizer::new()
            .tokenize("The policy's scope ISN'T the employee\u{2019}s call, can't you see")
            .unwrap();
        assert_eq!(
            tokens,
            vec![
                "The", "policy", "'s", "scope", "IS", "N'T", "the", "employee", "\u{2019}s",
                "call", ",", "ca", "n't", "you", "see"
            ]
        );
    }

    #[test]
    fn stopwords_are_case_folded_lookups() {
        let tokenizer = WordTokenizer::new();
        assert!(tokenizer.is_stopword("the"));
        assert!(!tokenizer.is_stopword("policy"));
        assert!(is_alphanumeric_token("gdpr2018"));
        assert!(!is_alphanumeric_token("don't"));
    }
}
