//! The index collaborator: statistics, positional postings, term vectors and id mapping.
//!
//! Query evaluation only ever reads through the [`Index`] trait. [`MemoryIndex`] is the
//! in-memory implementation used by the CLI and the tests; it can be persisted with the
//! `persistence` feature.

use std::collections::{BTreeMap, HashMap};

#[cfg(feature = "persistence")]
use serde::{Deserialize, Serialize};

use crate::analyzer::EnglishAnalyzer;
use crate::postings::{DocId, InvertedList};
use crate::Error;

/// Field used when a query term or corpus column names none.
pub const DEFAULT_FIELD: &str = "body";

/// One distinct term of a document's term vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorTerm {
    /// Indexed term.
    pub term: String,
    /// Frequency in this document field.
    pub tf: u32,
    /// Collection term frequency in this field.
    pub ctf: u64,
}

/// Per-document term statistics for one field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TermVector {
    /// Distinct terms, sorted by term.
    pub terms: Vec<VectorTerm>,
    /// Number of indexed positions (the field length).
    pub length: u64,
}

/// Read-only view of an inverted index.
///
/// Implementations must be immutable for the duration of a run; evaluation holds only shared
/// references.
pub trait Index {
    /// Postings for an analyzed term in `field`; an unknown term yields an empty list.
    fn postings(&self, term: &str, field: &str) -> Result<InvertedList, Error>;

    /// Number of documents in the collection.
    fn num_docs(&self) -> u64;

    /// Number of documents with at least one token in `field`.
    fn doc_count(&self, field: &str) -> u64;

    /// Total number of tokens in `field` across the collection.
    fn total_term_count(&self, field: &str) -> u64;

    /// Length of `field` in `doc_id` (0 if absent).
    fn doc_length(&self, field: &str, doc_id: DocId) -> u64;

    /// External id of an internal document id.
    fn external_id(&self, doc_id: DocId) -> Result<String, Error>;

    /// Internal id of an external document id; `NotFound` if absent.
    fn internal_id(&self, external_id: &str) -> Result<DocId, Error>;

    /// Term vector of `doc_id` restricted to `field`.
    fn term_vector(&self, doc_id: DocId, field: &str) -> Result<TermVector, Error>;
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "persistence", derive(Serialize, Deserialize))]
struct FieldIndex {
    postings: HashMap<String, InvertedList>,
    // Indexed by internal doc id; 0 for documents without this field.
    doc_lengths: Vec<u64>,
    // Indexed by internal doc id; (term, tf) sorted by term.
    doc_terms: Vec<Vec<(String, u32)>>,
    total_terms: u64,
    doc_count: u64,
}

/// In-memory fielded, positional inverted index.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "persistence", derive(Serialize, Deserialize))]
pub struct MemoryIndex {
    analyzer: EnglishAnalyzer,
    external_ids: Vec<String>,
    internal_ids: HashMap<String, DocId>,
    fields: BTreeMap<String, FieldIndex>,
}

impl MemoryIndex {
    /// Empty index that analyzes documents with `analyzer`.
    pub fn new(analyzer: EnglishAnalyzer) -> Self {
        Self {
            analyzer,
            ..Default::default()
        }
    }

    /// The analyzer documents were indexed with; queries must use the same one.
    pub fn analyzer(&self) -> &EnglishAnalyzer {
        &self.analyzer
    }

    /// Field names present in the index.
    pub fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.keys().map(String::as_str)
    }

    /// Add a document given `(field, text)` pairs. Returns its internal id.
    ///
    /// Text for a field repeated in `fields` is concatenated (positions continue).
    pub fn add_document(&mut self, external_id: &str, fields: &[(&str, &str)]) -> Result<DocId, Error> {
        if self.internal_ids.contains_key(external_id) {
            return Err(Error::DuplicateDocument(external_id.to_string()));
        }
        let doc_id = self.external_ids.len() as DocId;
        self.external_ids.push(external_id.to_string());
        self.internal_ids.insert(external_id.to_string(), doc_id);

        let mut by_field: BTreeMap<&str, Vec<(String, u32)>> = BTreeMap::new();
        for (field, text) in fields {
            let tokens = by_field.entry(*field).or_default();
            let offset = tokens.last().map_or(0, |(_, p)| p + 1);
            tokens.extend(
                self.analyzer
                    .analyze_with_positions(text)
                    .into_iter()
                    .map(|(t, p)| (t, p + offset)),
            );
        }

        for (field, tokens) in by_field {
            let fx = self.fields.entry(field.to_string()).or_default();
            let mut positions: BTreeMap<String, Vec<u32>> = BTreeMap::new();
            for (term, pos) in &tokens {
                positions.entry(term.clone()).or_default().push(*pos);
            }

            let len = tokens.len() as u64;
            fx.doc_lengths.resize(doc_id as usize + 1, 0);
            fx.doc_terms.resize(doc_id as usize + 1, Vec::new());
            fx.doc_lengths[doc_id as usize] = len;
            fx.total_terms += len;
            if len > 0 {
                fx.doc_count += 1;
            }

            let mut vector = Vec::with_capacity(positions.len());
            for (term, pos) in positions {
                vector.push((term.clone(), pos.len() as u32));
                fx.postings
                    .entry(term)
                    .or_insert_with(|| InvertedList::new(field))
                    .append(doc_id, pos);
            }
            fx.doc_terms[doc_id as usize] = vector;
        }
        Ok(doc_id)
    }

    /// Build an index from a corpus: one document per line,
    /// `external_id<TAB>column<TAB>...`.
    ///
    /// A column of the form `name=text` (name ASCII alphanumeric) is indexed into field `name`;
    /// any other column goes to `body`. Blank lines are skipped.
    pub fn from_corpus(corpus: &str, analyzer: EnglishAnalyzer) -> Result<Self, Error> {
        let mut index = Self::new(analyzer);
        for (lineno, line) in corpus.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut cols = line.split('\t');
            let external_id = cols.next().map(str::trim).unwrap_or_default();
            if external_id.is_empty() {
                return Err(Error::InvalidArgument {
                    op: "corpus".to_string(),
                    reason: format!("line {}: missing document id", lineno + 1),
                });
            }
            let fields: Vec<(&str, &str)> = cols.map(split_field_column).collect();
            index.add_document(external_id, &fields)?;
        }
        Ok(index)
    }

    /// Save the index (atomic replace of `path`).
    #[cfg(feature = "persistence")]
    pub fn save(&self, path: &std::path::Path) -> Result<(), Error> {
        use std::io::Write;

        let bytes = postcard::to_allocvec(self)?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => std::path::Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Load an index written by [`MemoryIndex::save`].
    #[cfg(feature = "persistence")]
    pub fn load(path: &std::path::Path) -> Result<Self, Error> {
        let bytes = std::fs::read(path)?;
        Ok(postcard::from_bytes(&bytes)?)
    }

    fn field(&self, field: &str) -> Option<&FieldIndex> {
        self.fields.get(field)
    }
}

fn split_field_column(col: &str) -> (&str, &str) {
    if let Some((name, text)) = col.split_once('=') {
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return (name, text);
        }
    }
    (DEFAULT_FIELD, col)
}

impl Index for MemoryIndex {
    fn postings(&self, term: &str, field: &str) -> Result<InvertedList, Error> {
        Ok(self
            .field(field)
            .and_then(|fx| fx.postings.get(term))
            .cloned()
            .unwrap_or_else(|| InvertedList::new(field)))
    }

    fn num_docs(&self) -> u64 {
        self.external_ids.len() as u64
    }

    fn doc_count(&self, field: &str) -> u64 {
        self.field(field).map_or(0, |fx| fx.doc_count)
    }

    fn total_term_count(&self, field: &str) -> u64 {
        self.field(field).map_or(0, |fx| fx.total_terms)
    }

    fn doc_length(&self, field: &str, doc_id: DocId) -> u64 {
        self.field(field)
            .and_then(|fx| fx.doc_lengths.get(doc_id as usize))
            .copied()
            .unwrap_or(0)
    }

    fn external_id(&self, doc_id: DocId) -> Result<String, Error> {
        self.external_ids
            .get(doc_id as usize)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("internal id {doc_id}")))
    }

    fn internal_id(&self, external_id: &str) -> Result<DocId, Error> {
        self.internal_ids
            .get(external_id)
            .copied()
            .ok_or_else(|| Error::NotFound(external_id.to_string()))
    }

    fn term_vector(&self, doc_id: DocId, field: &str) -> Result<TermVector, Error> {
        if doc_id as usize >= self.external_ids.len() {
            return Err(Error::NotFound(format!("internal id {doc_id}")));
        }
        let Some(fx) = self.field(field) else {
            return Ok(TermVector::default());
        };
        let Some(doc_terms) = fx.doc_terms.get(doc_id as usize) else {
            return Ok(TermVector::default());
        };
        let terms = doc_terms
            .iter()
            .map(|(term, tf)| VectorTerm {
                term: term.clone(),
                tf: *tf,
                ctf: fx.postings.get(term).map_or(0, |l| l.ctf),
            })
            .collect();
        Ok(TermVector {
            terms,
            length: fx.doc_lengths.get(doc_id as usize).copied().unwrap_or(0),
        })
    }
}
