//! `structir`: structured query evaluation over positional inverted lists.
//!
//! A query language with proximity and weighted operators, evaluated document-at-a-time under
//! one of four retrieval models:
//! - Unranked Boolean: match / no match;
//! - Ranked Boolean: term frequency, `min` over `#and`, `max` over `#or`;
//! - BM25, combined with `#sum`;
//! - Indri (Dirichlet + Jelinek-Mercer smoothed query likelihood), combined with `#and`,
//!   `#wand`, `#wsum`, with pseudo-relevance feedback query expansion.
//!
//! Pipeline: [`parser::QueryParser`] turns text into a [`query::ScoreNode`] tree,
//! [`eval::EvalContext`] evaluates it into a docid-sorted [`score_list::ScoreList`],
//! [`ranking`] orders it and writes TREC run lines, [`feedback`] expands Indri queries.
//! [`batch`] drives all of that from a parameter file.
//!
//! Scope:
//! - In-memory, fielded, positional indexes ([`index::MemoryIndex`])
//! - Deterministic ranking (score, then external id)
//!
//! Non-goals:
//! - Index construction at scale (segments, merging, compression)
//! - Relevance judgments / evaluation metrics
//!
//! References:
//! - Robertson & Zaragoza (2009): BM25 and beyond
//! - Metzler & Croft (2004): combining the language model and inference network approaches
//! - Lavrenko & Croft (2001): relevance-based language models

pub mod analyzer;
pub mod batch;
pub mod eval;
pub mod feedback;
pub mod index;
pub mod model;
pub mod params;
pub mod parser;
pub mod postings;
pub mod query;
pub mod ranking;
pub mod score_list;

pub use error::Error;
pub use eval::EvalContext;
pub use index::{Index, MemoryIndex};
pub use model::RetrievalModel;
pub use parser::QueryParser;

mod error {
    /// Errors for query parsing, evaluation, and batch runs.
    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        /// Nothing left to evaluate (blank query, or only stopwords).
        #[error("empty query")]
        EmptyQuery,
        /// Query text is not well formed.
        #[error("malformed query `{query}`: {reason}")]
        Parse {
            /// The offending query text.
            query: String,
            /// What is wrong with it.
            reason: String,
        },
        /// An operator got arguments it cannot take.
        #[error("invalid argument to {op}: {reason}")]
        InvalidArgument {
            /// Operator name.
            op: String,
            /// What is wrong.
            reason: String,
        },
        /// Arguments of a list operator come from different fields.
        #[error("{op} arguments must share one field: expected `{expected}`, found `{found}`")]
        FieldMismatch {
            /// Operator name.
            op: String,
            /// Field of the first argument.
            expected: String,
            /// First differing field.
            found: String,
        },
        /// Bad or missing weight in `#wand` / `#wsum`.
        #[error("invalid weight in {op}: {reason}")]
        InvalidWeight {
            /// Operator name.
            op: String,
            /// What is wrong.
            reason: String,
        },
        /// Operator is not defined for the active retrieval model.
        #[error("{op} is not supported by the {model} model")]
        Unsupported {
            /// Operator name.
            op: &'static str,
            /// Model name.
            model: &'static str,
        },
        /// Unknown document id.
        #[error("document not found: {0}")]
        NotFound(String),
        /// External document id added twice.
        #[error("duplicate document id: {0}")]
        DuplicateDocument(String),
        /// Required parameter is absent.
        #[error("missing required parameter: {0}")]
        MissingParameter(String),
        /// Parameter value cannot be used.
        #[error("invalid value for parameter {name}: `{value}`")]
        InvalidParameter {
            /// Parameter name.
            name: String,
            /// Value as written.
            value: String,
        },
        /// Filesystem error.
        #[error(transparent)]
        Io(#[from] std::io::Error),
        /// Index (de)serialization failed.
        #[cfg(feature = "persistence")]
        #[error("index encoding: {0}")]
        Persist(#[from] postcard::Error),
    }
}
