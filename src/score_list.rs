//! Document score lists produced by score operators.

use crate::postings::DocId;

/// A scored document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEntry {
    /// Internal document id.
    pub doc_id: DocId,
    /// Model-specific score.
    pub score: f64,
}

/// A list of scored documents.
///
/// Lists produced by operators are docid-ascending (operators merge them document-at-a-time);
/// external ids are only resolved when a list is ranked.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreList {
    /// Entries.
    pub entries: Vec<ScoreEntry>,
}

impl ScoreList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty list with capacity.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
        }
    }

    /// Append an entry.
    pub fn push(&mut self, doc_id: DocId, score: f64) {
        self.entries.push(ScoreEntry { doc_id, score });
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort entries by docid ascending.
    pub fn sort_by_doc_id(&mut self) {
        self.entries.sort_unstable_by_key(|e| e.doc_id);
    }

    /// Score of `doc_id`, if present (linear scan).
    pub fn score_of(&self, doc_id: DocId) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.doc_id == doc_id)
            .map(|e| e.score)
    }
}

impl FromIterator<(DocId, f64)> for ScoreList {
    fn from_iter<T: IntoIterator<Item = (DocId, f64)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(doc_id, score)| ScoreEntry { doc_id, score })
                .collect(),
        }
    }
}
