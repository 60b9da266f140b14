//! Score operators: `#score`, `#and`, `#or`, `#sum`, `#wand`, `#wsum`.
//!
//! Each operator returns its score list together with a [`Smoothing`] tree: how to score a
//! document the operator did not match. Only Indri uses non-zero defaults; Indri combinators
//! consult their children's trees for documents a child lacks.

use std::collections::HashMap;

use crate::eval::cursor::{intersect, union};
use crate::eval::{lists, EvalContext};
use crate::model::{bm25_idf, bm25_tf_weight, collection_probability, indri_score};
use crate::model::{Bm25Params, RetrievalModel};
use crate::postings::{DocId, InvertedList};
use crate::query::{ListNode, ScoreNode, Weighted};
use crate::score_list::{ScoreEntry, ScoreList};
use crate::Error;

/// Default score of an operator for a document absent from its list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Smoothing {
    /// Boolean, BM25, and operators without a default.
    Zero,
    /// Indri term (or list) with background probability `p_collection` in `field`.
    Dirichlet { field: String, p_collection: f64 },
    /// `#and`: geometric mean of the children's defaults.
    And(Vec<Smoothing>),
    /// `#wand`: product of `default_i ^ w_i` over normalized weights.
    Wand(Vec<(f64, Smoothing)>),
    /// `#wsum`: sum of `w_i * default_i` over normalized weights.
    Wsum(Vec<(f64, Smoothing)>),
}

impl Smoothing {
    pub(crate) fn default_score(&self, ctx: &EvalContext<'_>, doc_id: DocId) -> f64 {
        match self {
            Self::Zero => 0.0,
            Self::Dirichlet {
                field,
                p_collection,
            } => match &ctx.model {
                RetrievalModel::Indri(p) => {
                    let len = ctx.index.doc_length(field, doc_id) as f64;
                    indri_score(p, 0.0, len, *p_collection)
                }
                _ => 0.0,
            },
            Self::And(children) => {
                let product: f64 = children
                    .iter()
                    .map(|c| c.default_score(ctx, doc_id))
                    .product();
                product.powf(1.0 / children.len() as f64)
            }
            Self::Wand(children) => children
                .iter()
                .map(|(w, c)| c.default_score(ctx, doc_id).powf(*w))
                .product(),
            Self::Wsum(children) => children
                .iter()
                .map(|(w, c)| w * c.default_score(ctx, doc_id))
                .sum(),
        }
    }
}

/// A score list and the default for documents missing from it.
#[derive(Debug, Clone)]
pub(crate) struct Scored {
    pub(crate) list: ScoreList,
    pub(crate) smoothing: Smoothing,
}

impl Scored {
    fn unsmoothed(list: ScoreList) -> Self {
        Self {
            list,
            smoothing: Smoothing::Zero,
        }
    }
}

/// Evaluate a score-producing node.
pub(crate) fn evaluate(ctx: &EvalContext<'_>, node: &ScoreNode) -> Result<Scored, Error> {
    let scored = match node {
        ScoreNode::Score(list) => score(ctx, list)?,
        ScoreNode::And(children) => and(ctx, children)?,
        ScoreNode::Or(children) => or(ctx, children)?,
        ScoreNode::Sum(children) => sum(ctx, children)?,
        ScoreNode::Wand(children) => weighted(ctx, node.name(), children, Combine::Wand)?,
        ScoreNode::Wsum(children) => weighted(ctx, node.name(), children, Combine::Wsum)?,
    };
    debug_assert!(scored
        .list
        .entries
        .windows(2)
        .all(|w| w[0].doc_id < w[1].doc_id));
    tracing::debug!(op = node.name(), docs = scored.list.len(), "score list");
    Ok(scored)
}

fn unsupported(op: &'static str, model: &RetrievalModel) -> Error {
    Error::Unsupported {
        op,
        model: model.name(),
    }
}

fn evaluate_children(ctx: &EvalContext<'_>, children: &[ScoreNode]) -> Result<Vec<Scored>, Error> {
    children.iter().map(|c| evaluate(ctx, c)).collect()
}

fn entries_of(children: &[Scored]) -> Vec<&[ScoreEntry]> {
    children.iter().map(|c| c.list.entries.as_slice()).collect()
}

/// `#score`: turn an inverted list into scores under the active model.
fn score(ctx: &EvalContext<'_>, node: &ListNode) -> Result<Scored, Error> {
    let inv = lists::evaluate(ctx.index, node)?;
    let field = inv.field.as_str();
    let scored = match &ctx.model {
        RetrievalModel::UnrankedBoolean => {
            Scored::unsmoothed(inv.postings.iter().map(|p| (p.doc_id, 1.0)).collect())
        }
        RetrievalModel::RankedBoolean => {
            Scored::unsmoothed(inv.postings.iter().map(|p| (p.doc_id, p.tf() as f64)).collect())
        }
        RetrievalModel::Bm25(params) => Scored::unsmoothed(bm25(ctx, params, &inv)),
        RetrievalModel::Indri(params) => {
            let p_collection =
                collection_probability(inv.ctf, ctx.index.total_term_count(field));
            let list = inv
                .postings
                .iter()
                .map(|p| {
                    let len = ctx.index.doc_length(field, p.doc_id) as f64;
                    (p.doc_id, indri_score(params, p.tf() as f64, len, p_collection))
                })
                .collect();
            Scored {
                list,
                smoothing: Smoothing::Dirichlet {
                    field: field.to_string(),
                    p_collection,
                },
            }
        }
    };
    Ok(scored)
}

fn bm25(ctx: &EvalContext<'_>, params: &Bm25Params, inv: &InvertedList) -> ScoreList {
    if inv.is_empty() {
        return ScoreList::new();
    }
    let field = inv.field.as_str();
    let idf = bm25_idf(ctx.index.num_docs(), inv.df() as u64);
    if idf <= 0.0 {
        tracing::debug!(field, df = inv.df(), "term carries no evidence (idf <= 0)");
        return ScoreList::new();
    }
    let avg_doc_len =
        ctx.index.total_term_count(field) as f64 / ctx.index.doc_count(field) as f64;
    inv.postings
        .iter()
        .map(|p| {
            let len = ctx.index.doc_length(field, p.doc_id) as f64;
            let tf_weight = bm25_tf_weight(p.tf() as f64, len, avg_doc_len, params.k1, params.b);
            (p.doc_id, idf * tf_weight)
        })
        .collect()
}

/// `#and`: Boolean intersection or Indri geometric mean.
fn and(ctx: &EvalContext<'_>, children: &[ScoreNode]) -> Result<Scored, Error> {
    match &ctx.model {
        RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean => {
            let mut scored = evaluate_children(ctx, children)?;
            if scored.len() == 1 {
                return Ok(scored.remove(0));
            }
            // Intersect shortest first; the result does not depend on argument order.
            scored.sort_by_key(|s| s.list.len());
            let unranked = matches!(ctx.model, RetrievalModel::UnrankedBoolean);
            let mut out = ScoreList::with_capacity(scored[0].list.len());
            intersect(&entries_of(&scored), |doc_id, matched| {
                let score = if unranked {
                    1.0
                } else {
                    matched.iter().map(|e| e.score).fold(f64::INFINITY, f64::min)
                };
                out.push(doc_id, score);
            });
            Ok(Scored::unsmoothed(out))
        }
        RetrievalModel::Indri(_) => {
            let mut scored = evaluate_children(ctx, children)?;
            if scored.len() == 1 {
                return Ok(scored.remove(0));
            }
            let exponent = 1.0 / scored.len() as f64;
            let mut out = ScoreList::new();
            union(&entries_of(&scored), |doc_id, matched| {
                let product: f64 = matched
                    .iter()
                    .zip(&scored)
                    .map(|(m, child)| match m {
                        Some(e) => e.score,
                        None => child.smoothing.default_score(ctx, doc_id),
                    })
                    .product();
                out.push(doc_id, product.powf(exponent));
            });
            let smoothing = Smoothing::And(scored.into_iter().map(|s| s.smoothing).collect());
            Ok(Scored {
                list: out,
                smoothing,
            })
        }
        other => Err(unsupported("#and", other)),
    }
}

/// `#or`: Boolean disjunction; Ranked Boolean keeps the maximum child score.
fn or(ctx: &EvalContext<'_>, children: &[ScoreNode]) -> Result<Scored, Error> {
    if !ctx.model.is_boolean() {
        return Err(unsupported("#or", &ctx.model));
    }
    let scored = evaluate_children(ctx, children)?;
    let unranked = matches!(ctx.model, RetrievalModel::UnrankedBoolean);
    let mut best: HashMap<DocId, f64> = HashMap::new();
    for child in &scored {
        for e in &child.list.entries {
            let score = if unranked { 1.0 } else { e.score };
            best.entry(e.doc_id)
                .and_modify(|s| *s = s.max(score))
                .or_insert(score);
        }
    }
    let mut out: ScoreList = best.into_iter().collect();
    out.sort_by_doc_id();
    Ok(Scored::unsmoothed(out))
}

/// `#sum`: BM25 sum of child scores.
fn sum(ctx: &EvalContext<'_>, children: &[ScoreNode]) -> Result<Scored, Error> {
    if !matches!(ctx.model, RetrievalModel::Bm25(_)) {
        return Err(unsupported("#sum", &ctx.model));
    }
    let scored = evaluate_children(ctx, children)?;
    let mut totals: HashMap<DocId, f64> = HashMap::new();
    for child in &scored {
        for e in &child.list.entries {
            *totals.entry(e.doc_id).or_insert(0.0) += e.score;
        }
    }
    let mut out: ScoreList = totals.into_iter().collect();
    out.sort_by_doc_id();
    Ok(Scored::unsmoothed(out))
}

#[derive(Debug, Clone, Copy)]
enum Combine {
    Wand,
    Wsum,
}

/// `#wand` / `#wsum` over normalized weights (Indri only).
fn weighted(
    ctx: &EvalContext<'_>,
    op: &'static str,
    children: &[Weighted],
    combine: Combine,
) -> Result<Scored, Error> {
    if !matches!(ctx.model, RetrievalModel::Indri(_)) {
        return Err(unsupported(op, &ctx.model));
    }
    let total: f64 = children.iter().map(|c| c.weight).sum();
    let mut scored = Vec::with_capacity(children.len());
    for c in children {
        scored.push(evaluate(ctx, &c.node)?);
    }
    if scored.len() == 1 {
        return Ok(scored.remove(0));
    }
    let weights: Vec<f64> = children.iter().map(|c| c.weight / total).collect();

    let mut out = ScoreList::new();
    union(&entries_of(&scored), |doc_id, matched| {
        let parts = matched.iter().zip(&scored).zip(&weights).map(|((m, child), w)| {
            let p = match m {
                Some(e) => e.score,
                None => child.smoothing.default_score(ctx, doc_id),
            };
            (*w, p)
        });
        let score: f64 = match combine {
            Combine::Wand => parts.map(|(w, p)| p.powf(w)).product(),
            Combine::Wsum => parts.map(|(w, p)| w * p).sum(),
        };
        out.push(doc_id, score);
    });

    let pairs: Vec<(f64, Smoothing)> = weights
        .into_iter()
        .zip(scored.into_iter().map(|s| s.smoothing))
        .collect();
    let smoothing = match combine {
        Combine::Wand => Smoothing::Wand(pairs),
        Combine::Wsum => Smoothing::Wsum(pairs),
    };
    Ok(Scored {
        list: out,
        smoothing,
    })
}
