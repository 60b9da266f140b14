//! Query evaluation: operator trees in, docid-sorted score lists out.
//!
//! Evaluation is document-at-a-time: every operator walks its arguments' docid-sorted lists
//! with one cursor per argument ([`cursor`]) and emits a docid-sorted result. List operators
//! live in [`lists`], score operators and the Indri default scores in [`scores`].
//!
//! Which score operators exist depends on the retrieval model:
//!
//! | operator | Unranked/Ranked Boolean | BM25 | Indri |
//! |----------|-------------------------|------|-------|
//! | `#score` | yes                     | yes  | yes   |
//! | `#and`   | intersection            | -    | geometric mean |
//! | `#or`    | union                   | -    | -     |
//! | `#sum`   | -                       | yes  | -     |
//! | `#wand`  | -                       | -    | yes   |
//! | `#wsum`  | -                       | -    | yes   |
//!
//! Anything else is [`Error::Unsupported`].

pub(crate) mod cursor;
pub(crate) mod lists;
pub(crate) mod scores;

use crate::index::Index;
use crate::model::RetrievalModel;
use crate::postings::InvertedList;
use crate::query::{ListNode, ScoreNode};
use crate::score_list::ScoreList;
use crate::Error;

/// An index and a retrieval model: everything a query is evaluated against.
pub struct EvalContext<'a> {
    pub(crate) index: &'a dyn Index,
    pub(crate) model: RetrievalModel,
}

impl<'a> EvalContext<'a> {
    /// Evaluate queries against `index` under `model`.
    pub fn new(index: &'a dyn Index, model: RetrievalModel) -> Self {
        Self { index, model }
    }

    /// The active retrieval model.
    pub fn model(&self) -> &RetrievalModel {
        &self.model
    }

    /// The index queries run against.
    pub fn index(&self) -> &'a dyn Index {
        self.index
    }

    /// Evaluate a score operator tree. The result is docid-ascending.
    pub fn evaluate(&self, query: &ScoreNode) -> Result<ScoreList, Error> {
        Ok(scores::evaluate(self, query)?.list)
    }

    /// Evaluate a list operator tree into a positional inverted list.
    pub fn evaluate_list(&self, node: &ListNode) -> Result<InvertedList, Error> {
        lists::evaluate(self.index, node)
    }
}
