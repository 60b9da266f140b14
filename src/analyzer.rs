//! Text analysis: tokenization, case folding, stopword removal, light stemming.
//!
//! The same analyzer must be used to build an index and to parse queries against it.

#[cfg(feature = "persistence")]
use serde::{Deserialize, Serialize};

/// Turns raw text into index terms.
///
/// Zero output tokens is valid (e.g. a stopword); query parsing drops such arguments.
pub trait Analyzer {
    /// Analyze `text` into terms, in order.
    fn analyze(&self, text: &str) -> Vec<String>;
}

/// Stopwords removed by [`EnglishAnalyzer`].
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// English analyzer: alphanumeric tokens, lowercased, stopwords removed, optional S-stemming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(Serialize, Deserialize))]
pub struct EnglishAnalyzer {
    /// Apply the plural S-stemmer.
    pub stem: bool,
}

impl Default for EnglishAnalyzer {
    fn default() -> Self {
        Self { stem: true }
    }
}

impl EnglishAnalyzer {
    /// Analyzer without stemming.
    pub fn unstemmed() -> Self {
        Self { stem: false }
    }

    /// Analyze `text` into `(term, position)` pairs.
    ///
    /// Positions count every raw token, so removed stopwords leave gaps.
    pub fn analyze_with_positions(&self, text: &str) -> Vec<(String, u32)> {
        let mut out = Vec::new();
        let raw = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());
        for (position, token) in raw.enumerate() {
            let lower = token.to_lowercase();
            if STOPWORDS.contains(&lower.as_str()) {
                continue;
            }
            let term = if self.stem { s_stem(&lower) } else { lower };
            out.push((term, position as u32));
        }
        out
    }
}

impl Analyzer for EnglishAnalyzer {
    fn analyze(&self, text: &str) -> Vec<String> {
        self.analyze_with_positions(text)
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }
}

/// Harman's S-stemmer (plural removal). Idempotent; words of three characters or fewer are kept.
fn s_stem(word: &str) -> String {
    if word.chars().count() <= 3 {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.ends_with('e') && !stem.ends_with('a') {
            return format!("{stem}y");
        }
    }
    if let Some(stem) = word.strip_suffix("es") {
        if !stem.ends_with('a') && !stem.ends_with('e') && !stem.ends_with('o') {
            return format!("{stem}e");
        }
    }
    if let Some(stem) = word.strip_suffix('s') {
        if !stem.ends_with('u') && !stem.ends_with('s') {
            return stem.to_string();
        }
    }
    word.to_string()
}
