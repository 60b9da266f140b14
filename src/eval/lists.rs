//! Inverted-list operators: term lookup, `#syn`, `#near/N`, `#window/N`.

use crate::eval::cursor::{intersect, union};
use crate::index::Index;
use crate::postings::{InvertedList, Posting};
use crate::query::ListNode;
use crate::Error;

/// Evaluate a list-producing node against `index`.
pub(crate) fn evaluate(index: &dyn Index, node: &ListNode) -> Result<InvertedList, Error> {
    let list = match node {
        ListNode::Term { term, field } => index.postings(term, field)?,
        ListNode::Syn(args) => {
            let lists = evaluate_args(index, args)?;
            synonym(node.field(), &lists)
        }
        ListNode::Near { distance, args } => {
            let lists = evaluate_args(index, args)?;
            let d = *distance;
            proximity(node.field(), &lists, |ps| near_positions(d, ps))
        }
        ListNode::Window { width, args } => {
            let lists = evaluate_args(index, args)?;
            let w = *width;
            proximity(node.field(), &lists, |ps| window_positions(w, ps))
        }
    };
    tracing::debug!(op = %node.name(), df = list.df(), ctf = list.ctf, "inverted list");
    Ok(list)
}

fn evaluate_args(index: &dyn Index, args: &[ListNode]) -> Result<Vec<InvertedList>, Error> {
    args.iter().map(|a| evaluate(index, a)).collect()
}

fn postings_of(lists: &[InvertedList]) -> Vec<&[Posting]> {
    lists.iter().map(|l| l.postings.as_slice()).collect()
}

/// Union of arguments; positions of a document are merged and deduplicated.
pub(crate) fn synonym(field: &str, lists: &[InvertedList]) -> InvertedList {
    let mut out = InvertedList::new(field);
    union(&postings_of(lists), |doc_id, matched| {
        let mut positions: Vec<u32> = matched
            .iter()
            .flatten()
            .flat_map(|p| p.positions.iter().copied())
            .collect();
        positions.sort_unstable();
        positions.dedup();
        out.append(doc_id, positions);
    });
    out
}

/// Documents containing every argument, keeping those where `matcher` finds at least one hit.
///
/// `matcher` returns the hit positions for one document's postings (in argument order).
fn proximity(
    field: &str,
    lists: &[InvertedList],
    matcher: impl Fn(&[&Posting]) -> Vec<u32>,
) -> InvertedList {
    let mut out = InvertedList::new(field);
    intersect(&postings_of(lists), |doc_id, matched| {
        out.append(doc_id, matcher(matched));
    });
    out
}

/// Ordered-proximity hits in one document.
///
/// Each position of the first argument is an anchor. Every following argument must occur
/// strictly after the previous argument's match and at most `distance` positions later. A hit is
/// recorded at the last argument's position; matched positions are consumed, so no position
/// contributes to two hits.
pub(crate) fn near_positions(distance: u32, postings: &[&Posting]) -> Vec<u32> {
    let Some((first, rest)) = postings.split_first() else {
        return Vec::new();
    };
    let mut next = vec![0usize; rest.len()];
    let mut hits = Vec::new();

    'anchor: for &anchor in &first.positions {
        let mut prev = anchor;
        for (j, p) in rest.iter().enumerate() {
            let pos = &p.positions;
            while next[j] < pos.len() && pos[next[j]] <= prev {
                next[j] += 1;
            }
            // Later anchors need even larger positions here.
            let Some(&cur) = pos.get(next[j]) else {
                break 'anchor;
            };
            if cur - prev > distance {
                continue 'anchor;
            }
            prev = cur;
        }
        hits.push(prev);
        for n in next.iter_mut() {
            *n += 1;
        }
    }
    hits
}

/// Unordered-proximity hits in one document.
///
/// While every argument has positions left: if the span of the current positions
/// (`max - min + 1`) fits in `width`, record a hit at `max` and advance every argument;
/// otherwise advance the argument at `min`.
pub(crate) fn window_positions(width: u32, postings: &[&Posting]) -> Vec<u32> {
    let mut next = vec![0usize; postings.len()];
    let mut hits = Vec::new();
    if postings.is_empty() {
        return hits;
    }

    loop {
        let mut min = u32::MAX;
        let mut min_arg = 0;
        let mut max = 0;
        for (i, p) in postings.iter().enumerate() {
            let Some(&cur) = p.positions.get(next[i]) else {
                return hits;
            };
            if cur < min {
                min = cur;
                min_arg = i;
            }
            max = max.max(cur);
        }
        if max - min + 1 <= width {
            hits.push(max);
            for n in next.iter_mut() {
                *n += 1;
            }
        } else {
            next[min_arg] += 1;
        }
    }
}
