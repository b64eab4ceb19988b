use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A `(text, label)` span. Serialized as a two element array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Entity {
    pub text: String,
    pub label: String,
}

impl Entity {
    pub fn new(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
        }
    }
}

impl From<(String, String)> for Entity {
    fn from((text, label): (String, String)) -> Self {
        Self { text, label }
    }
}

impl From<Entity> for (String, String) {
    fn from(entity: Entity) -> Self {
        (entity.text, entity.label)
    }
}

pub trait EntityRecognizer: Send + Sync {
    /// Spans in source order; duplicates are kept.
    fn recognize(&self, text: &str) -> Result<Vec<Entity>>;
}

const MONTHS: &str = "January|February|March|April|May|June|July|August|September|October|November|December";

const ORG_SUFFIXES: &[&str] = &[
    "Inc",
    "Inc.",
    "Ltd",
    "Ltd.",
    "LLC",
    "Corp",
    "Corp.",
    "Corporation",
    "Company",
    "Department",
    "Agency",
    "Authority",
    "Committee",
    "Board",
    "Bank",
    "University",
    "Group",
    "Council",
    "Office",
    "Ministry",
    "Commission",
    "Foundation",
];

const LEADING_DETERMINERS: &[&str] = &["The ", "A ", "An ", "This ", "Our ", "All "];

/// Pattern based recogniser. Compiling the patterns is the expensive part,
/// so one instance is built per worker and reused for every chunk.
pub struct RuleBasedRecognizer {
    money: Regex,
    percent: Regex,
    date: Regex,
    law: Regex,
    proper: Regex,
}

impl RuleBasedRecognizer {
    pub fn new() -> Result<Self> {
        let money = Regex::new(
            r"(?:[$€£]\s?\d[\d,]*(?:\.\d+)?(?:\s?(?:million|billion|thousand|bn|k))?)|(?:\b\d[\d,]*(?:\.\d+)?\s?(?:USD|EUR|GBP|dollars|euros|pounds)\b)",
        )
        .context("invalid money pattern")?;
        let percent = Regex::new(r"\b\d+(?:\.\d+)?(?:\s?%|\s?percent\b)")
            .context("invalid percent pattern")?;
        let date = Regex::new(&format!(
            r"\b(?:(?:{MONTHS})\s+\d{{1,2}}(?:st|nd|rd|th)?(?:,\s*\d{{4}})?|\d{{1,2}}\s+(?:{MONTHS})\s+\d{{4}}|(?:{MONTHS})\s+\d{{4}}|\d{{4}}-\d{{2}}-\d{{2}}|\d{{1,2}}/\d{{1,2}}/\d{{2,4}})\b"
        ))
        .context("invalid date pattern")?;
        let law = Regex::new(
            r"\b(?:(?:Section|Article|Clause|Regulation)\s+\d+(?:\.\d+)*(?:\([a-z0-9]+\))?|GDPR|HIPAA|CCPA|SOX|PCI DSS|ISO\s?\d{4,5})",
        )
        .context("invalid law pattern")?;
        let proper = Regex::new(r"\b[A-Z][\w&'-]*(?:[ \t]+(?:(?:of|and|for|the)[ \t]+)?[A-Z][\w&'-]*)*")
            .context("invalid proper noun pattern")?;

        Ok(Self {
            money,
            percent,
            date,
            law,
            proper,
        })
    }

    fn classify_proper(&self, text: &str, start: usize, span: &str) -> Option<(usize, String, &'static str)> {
        let mut offset = 0;
        let mut span = span;
        for determiner in LEADING_DETERMINERS {
            if let Some(rest) = span.strip_prefix(determiner) {
                offset = determiner.len();
                span = rest;
                break;
            }
        }

        let words: Vec<&str> = span.split_whitespace().collect();
        let last = words.last()?;
        if ORG_SUFFIXES.contains(last) {
            return Some((start + offset, span.to_string(), "ORG"));
        }

        if words.len() == 1 {
            let word = words[0];
            let is_acronym = word.len() >= 2 && word.chars().all(|c| c.is_ascii_uppercase());
            if is_acronym {
                return Some((start + offset, span.to_string(), "ORG"));
            }
            // a lone capitalised word at a sentence start is just grammar
            if offset > 0 || is_sentence_start(text, start) {
                return None;
            }
        }

        Some((start + offset, span.to_string(), "PROPER_NOUN"))
    }
}

impl EntityRecognizer for RuleBasedRecognizer {
    fn recognize(&self, text: &str) -> Result<Vec<Entity>> {
        let mut spans: Vec<(usize, usize, String, &'static str)> = Vec::new();

        let typed = [
            (&self.money, "MONEY"),
            (&self.percent, "PERCENT"),
            (&self.date, "DATE"),
            (&self.law, "LAW"),
        ];
        for (pattern, label) in typed {
            for found in pattern.find_iter(text) {
                push_if_free(&mut spans, found.start(), found.end(), found.as_str(), label);
            }
        }

        for found in self.proper.find_iter(text) {
            if let Some((start, span, label)) = self.classify_proper(text, found.start(), found.as_str()) {
                let end = start + span.len();
                push_if_free(&mut spans, start, end, &span, label);
            }
        }

        spans.sort_by_key(|(start, ..)| *start);
        Ok(spans
            .into_iter()
            .map(|(_, _, span, label)| Entity::new(span.trim(), label))
            .collect())
    }
}

fn push_if_free(
    spans: &mut Vec<(usize, usize, String, &'static str)>,
    start: usize,
    end: usize,
    text: &str,
    label: &'static str,
) {
    let overlaps = spans.iter().any(|(s, e, ..)| start < *e && *s < end);
    if !overlaps {
        spans.push((start, end, text.to_string(), label));
    }
}

fn is_sentence_start(text: &str, start: usize) -> bool {
    match text[..start].trim_end().chars().last() {
        None => true,
        Some(c) => matches!(c, '.' | '!' | '?' | ':' | ';' | '|' | ']' | '"' | '\u{201c}'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_keep_source_order_and_labels() {
        let recognizer = RuleBasedRecognizer::new().unwrap();
        let entities = recognizer
            .recognize("Reports go to the Risk Committee by March 3, 2025 under GDPR for $1,200 fees.")
            .unwrap();
        assert_eq!(
            entities,
            vec![
                Entity::new("Risk Committee", "ORG"),
                Entity::new("March 3, 2025", "DATE"),
                Entity::new("GDPR", "LAW"),
                Entity::new("$1,200", "MONEY"),
            ]
        );
    }

    #[test]
    fn sentence_initial_word_is_not_an_entity() {
        let recognizer = RuleBasedRecognizer::new().unwrap();
        let entities = recognizer
            .recognize("Employees must comply with the data protection policy.")
            .unwrap();
        assert!(entities.is_empty());
    }

    #[test]
    fn entity_serializes_as_pair() {
        let json = serde_json::to_string(&Entity::new("Acme Inc", "ORG")).unwrap();
        assert_eq!(json, r#"["Acme Inc","ORG"]"#);
    }
}
