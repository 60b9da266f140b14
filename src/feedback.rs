//! Pseudo-relevance feedback (Indri).
//!
//! The top `docs` documents of an initial ranking are assumed relevant. Every term of their
//! `body` term vectors is scored
//!
//! ```text
//! score(t) = Σ_d  score(d) · (tf(t,d) + μ·p(t|C)) / (|d| + μ) · ln(1 / p(t|C))
//! ```
//!
//! over all top documents `d` (documents without `t` contribute with `tf = 0`, unless `μ = 0`).
//! The `terms` best terms form an expansion query, which is combined with the original:
//!
//! ```text
//! #wand(w #and(original) (1 - w) #wand(s1 t1 s2 t2 ...))
//! ```
//!
//! References:
//! - Lavrenko & Croft (2001): relevance-based language models
//! - Metzler & Croft (2004): Indri query expansion

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;

use crate::eval::EvalContext;
use crate::index::{Index, DEFAULT_FIELD};
use crate::model::RetrievalModel;
use crate::parser::QueryParser;
use crate::ranking::{rank, RankedDoc};
use crate::Error;

/// Feedback settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackConfig {
    /// Number of top documents treated as relevant.
    pub docs: usize,
    /// Number of expansion terms.
    pub terms: usize,
    /// Dirichlet prior for the feedback document models.
    pub mu: f64,
    /// Weight of the original query in the expanded query, in `[0, 1]`.
    pub orig_weight: f64,
}

impl FeedbackConfig {
    /// Check ranges; the error names the offending parameter.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |name: &str, value: String| Error::InvalidParameter {
            name: name.to_string(),
            value,
        };
        if self.docs == 0 {
            return Err(invalid("fbDocs", self.docs.to_string()));
        }
        if self.terms == 0 {
            return Err(invalid("fbTerms", self.terms.to_string()));
        }
        if !self.mu.is_finite() || self.mu < 0.0 {
            return Err(invalid("fbMu", self.mu.to_string()));
        }
        if !(0.0..=1.0).contains(&self.orig_weight) {
            return Err(invalid("fbOrigWeight", self.orig_weight.to_string()));
        }
        Ok(())
    }
}

/// A selected expansion term.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionTerm {
    /// Index term.
    pub term: String,
    /// Accumulated feedback score (used as its `#wand` weight).
    pub score: f64,
}

/// Selected expansion terms, best first (term ascending on ties).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expansion {
    /// Terms in output order.
    pub terms: Vec<ExpansionTerm>,
}

impl Expansion {
    /// Whether no term was selected.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The expanded query for `original`: `#wand(w #and(original) (1 - w) <self>)`.
    pub fn expanded_query(&self, original: &str, orig_weight: f64) -> String {
        format!(
            "#wand({} #and({}) {} {})",
            orig_weight,
            original.trim(),
            1.0 - orig_weight,
            self
        )
    }
}

/// Renders `#wand(s1 t1 s2 t2 ...)`.
impl fmt::Display for Expansion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("#wand(")?;
        for (i, t) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{} {}", t.score, t.term)?;
        }
        f.write_str(")")
    }
}

#[derive(PartialEq)]
struct FloatOrd(f64);
impl Eq for FloatOrd {}
impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

struct Candidate {
    score: f64,
    p_collection: f64,
    // Indexed by rank among the top documents.
    seen: Vec<bool>,
}

/// Score the terms of the top documents of `ranking` and keep the best `config.terms`.
pub fn select_terms(
    index: &dyn Index,
    ranking: &[RankedDoc],
    config: &FeedbackConfig,
) -> Result<Expansion, Error> {
    let top = &ranking[..ranking.len().min(config.docs)];
    let total = index.total_term_count(DEFAULT_FIELD);
    let mu = config.mu;
    if top.is_empty() || total == 0 {
        return Ok(Expansion::default());
    }

    let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
    let mut lengths = Vec::with_capacity(top.len());
    for (r, doc) in top.iter().enumerate() {
        let vector = index.term_vector(doc.doc_id, DEFAULT_FIELD)?;
        let len = vector.length as f64;
        lengths.push(len);
        for vt in vector.terms {
            if vt.term.is_empty() || vt.term.contains(['.', ',']) || vt.ctf == 0 {
                continue;
            }
            let p_collection = vt.ctf as f64 / total as f64;
            let idf = (1.0 / p_collection).ln();
            let contribution = doc.score * ((vt.tf as f64 + mu * p_collection) / (len + mu)) * idf;
            let c = candidates.entry(vt.term).or_insert_with(|| Candidate {
                score: 0.0,
                p_collection,
                seen: vec![false; top.len()],
            });
            c.score += contribution;
            c.seen[r] = true;
        }
    }

    if mu != 0.0 {
        for c in candidates.values_mut() {
            let idf = (1.0 / c.p_collection).ln();
            for (r, doc) in top.iter().enumerate() {
                if !c.seen[r] {
                    c.score += doc.score * ((0.0 + mu * c.p_collection) / (lengths[r] + mu)) * idf;
                }
            }
        }
    }

    // Min-heap top-k.
    let k = config.terms;
    let mut heap: BinaryHeap<Reverse<(FloatOrd, String)>> = BinaryHeap::with_capacity(k + 1);
    for (term, c) in candidates {
        if !c.score.is_finite() || c.score <= 0.0 {
            continue;
        }
        if heap.len() < k {
            heap.push(Reverse((FloatOrd(c.score), term)));
        } else if let Some(&Reverse((FloatOrd(min_score), _))) = heap.peek() {
            if c.score > min_score {
                heap.pop();
                heap.push(Reverse((FloatOrd(c.score), term)));
            }
        }
    }

    let mut terms: Vec<ExpansionTerm> = heap
        .into_iter()
        .map(|Reverse((FloatOrd(score), term))| ExpansionTerm { term, score })
        .collect();
    terms.sort_unstable_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.term.cmp(&b.term)));
    tracing::debug!(
        selected = terms.len(),
        top_docs = top.len(),
        "selected expansion terms"
    );
    Ok(Expansion { terms })
}

/// Outcome of a feedback round.
#[derive(Debug, Clone)]
pub struct Feedback {
    /// Selected terms.
    pub expansion: Expansion,
    /// Full expanded query text.
    pub query: String,
    /// Ranking of the expanded query.
    pub ranking: Vec<RankedDoc>,
}

/// Expand `original` from its initial `ranking` and evaluate the expanded query.
///
/// Requires the Indri model. With no usable expansion terms the initial ranking is kept.
pub fn expand(
    ctx: &EvalContext<'_>,
    parser: &QueryParser<'_>,
    original: &str,
    ranking: &[RankedDoc],
    config: &FeedbackConfig,
) -> Result<Feedback, Error> {
    if !matches!(ctx.model(), RetrievalModel::Indri(_)) {
        return Err(Error::Unsupported {
            op: "feedback",
            model: ctx.model().name(),
        });
    }
    let expansion = select_terms(ctx.index(), ranking, config)?;
    if expansion.is_empty() {
        return Ok(Feedback {
            expansion,
            query: original.to_string(),
            ranking: ranking.to_vec(),
        });
    }
    let query = expansion.expanded_query(original, config.orig_weight);
    let tree = parser.parse(&query)?;
    let ranking = rank(ctx.index(), &ctx.evaluate(&tree)?)?;
    Ok(Feedback {
        expansion,
        query,
        ranking,
    })
}
