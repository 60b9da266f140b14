//! Positional postings and inverted lists.

#[cfg(feature = "persistence")]
use serde::{Deserialize, Serialize};

/// Internal document id (dense, assigned by the index).
pub type DocId = u32;

/// One term's occurrences within one field of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(Serialize, Deserialize))]
pub struct Posting {
    /// Internal document id.
    pub doc_id: DocId,
    /// Strictly increasing term positions.
    pub positions: Vec<u32>,
}

impl Posting {
    /// Create a posting from its positions.
    pub fn new(doc_id: DocId, positions: Vec<u32>) -> Self {
        debug_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        Self { doc_id, positions }
    }

    /// Term frequency (number of positions).
    pub fn tf(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// A docid-sorted list of postings for one field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "persistence", derive(Serialize, Deserialize))]
pub struct InvertedList {
    /// Field every posting belongs to.
    pub field: String,
    /// Collection term frequency: total occurrences across all postings.
    pub ctf: u64,
    /// Postings, docid ascending, unique docids.
    pub postings: Vec<Posting>,
}

impl InvertedList {
    /// Empty list for `field`.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ctf: 0,
            postings: Vec::new(),
        }
    }

    /// Document frequency.
    pub fn df(&self) -> usize {
        self.postings.len()
    }

    /// Whether the list has no postings.
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Append a posting; docids must arrive in ascending order. Empty position sets are ignored.
    pub fn append(&mut self, doc_id: DocId, positions: Vec<u32>) {
        if positions.is_empty() {
            return;
        }
        debug_assert!(self.postings.last().map_or(true, |p| p.doc_id < doc_id));
        self.ctf += positions.len() as u64;
        self.postings.push(Posting::new(doc_id, positions));
    }
}
