//! Per-argument cursors and the document-at-a-time merge drivers built on them.
//!
//! Every multi-argument operator is one of two shapes over docid-sorted inputs:
//! - [`intersect`]: documents present under every cursor (AND, NEAR, WINDOW);
//! - [`union`]: documents present under any cursor (SYN, Indri AND/WAND/WSUM).
//!
//! Both advance cursors in a single pass; neither looks at a document twice.

use crate::postings::{DocId, Posting};
use crate::score_list::ScoreEntry;

/// Anything carrying a document id, sorted by it within its list.
pub(crate) trait DocKeyed {
    fn doc_id(&self) -> DocId;
}

impl DocKeyed for Posting {
    fn doc_id(&self) -> DocId {
        self.doc_id
    }
}

impl DocKeyed for ScoreEntry {
    fn doc_id(&self) -> DocId {
        self.doc_id
    }
}

/// Merge state for one argument: the argument's items and the next unread index.
///
/// Created fresh for each evaluation and dropped when it returns.
pub(crate) struct ArgCursor<'a, T> {
    items: &'a [T],
    next: usize,
}

impl<'a, T: DocKeyed> ArgCursor<'a, T> {
    pub(crate) fn new(items: &'a [T]) -> Self {
        Self { items, next: 0 }
    }

    pub(crate) fn current(&self) -> Option<&'a T> {
        self.items.get(self.next)
    }

    pub(crate) fn doc_id(&self) -> Option<DocId> {
        self.current().map(DocKeyed::doc_id)
    }

    pub(crate) fn advance(&mut self) {
        self.next += 1;
    }
}

/// Call `emit` for every docid present in all `lists`, in ascending order, with the matching
/// item of each list (in `lists` order).
///
/// Stops as soon as any list is exhausted.
pub(crate) fn intersect<'a, T: DocKeyed>(lists: &[&'a [T]], mut emit: impl FnMut(DocId, &[&'a T])) {
    if lists.is_empty() {
        return;
    }
    let mut cursors: Vec<ArgCursor<'a, T>> = lists.iter().map(|l| ArgCursor::new(l)).collect();
    let mut matched: Vec<&'a T> = Vec::with_capacity(lists.len());

    loop {
        let mut min = DocId::MAX;
        let mut max = DocId::MIN;
        for c in &cursors {
            let Some(d) = c.doc_id() else {
                return;
            };
            min = min.min(d);
            max = max.max(d);
        }

        if min == max {
            matched.clear();
            for c in cursors.iter_mut() {
                if let Some(item) = c.current() {
                    matched.push(item);
                }
                c.advance();
            }
            emit(min, &matched);
        } else {
            for c in cursors.iter_mut() {
                if c.doc_id() == Some(min) {
                    c.advance();
                }
            }
        }
    }
}

/// Call `emit` for every docid present in any of `lists`, in ascending order, with the item of
/// each list at that docid (`None` where the list lacks it).
pub(crate) fn union<'a, T: DocKeyed>(
    lists: &[&'a [T]],
    mut emit: impl FnMut(DocId, &[Option<&'a T>]),
) {
    let mut cursors: Vec<ArgCursor<'a, T>> = lists.iter().map(|l| ArgCursor::new(l)).collect();
    let mut matched: Vec<Option<&'a T>> = Vec::with_capacity(lists.len());

    loop {
        let Some(min) = cursors.iter().filter_map(ArgCursor::doc_id).min() else {
            return;
        };
        matched.clear();
        for c in cursors.iter_mut() {
            if c.doc_id() == Some(min) {
                matched.push(c.current());
                c.advance();
            } else {
                matched.push(None);
            }
        }
        emit(min, &matched);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(ids: &[DocId]) -> Vec<ScoreEntry> {
        ids.iter()
            .map(|&doc_id| ScoreEntry {
                doc_id,
                score: doc_id as f64,
            })
            .collect()
    }

    #[test]
    fn intersect_emits_common_docids() {
        let a = entries(&[1, 3, 5, 7, 9]);
        let b = entries(&[3, 4, 5, 9, 11]);
        let c = entries(&[0, 3, 9]);
        let mut got = Vec::new();
        intersect(&[&a[..], &b[..], &c[..]], |d, items| {
            assert_eq!(items.len(), 3);
            got.push(d);
        });
        assert_eq!(got, vec![3, 9]);
    }

    #[test]
    fn intersect_with_empty_list_is_empty() {
        let a = entries(&[1, 2]);
        let b: Vec<ScoreEntry> = Vec::new();
        let mut n = 0;
        intersect(&[&a[..], &b[..]], |_, _| n += 1);
        assert_eq!(n, 0);
    }

    #[test]
    fn union_marks_missing_arguments() {
        let a = entries(&[1, 4]);
        let b = entries(&[2, 4, 6]);
        let mut got = Vec::new();
        union(&[&a[..], &b[..]], |d, items| {
            got.push((d, items.iter().map(Option::is_some).collect::<Vec<_>>()));
        });
        assert_eq!(
            got,
            vec![
                (1, vec![true, false]),
                (2, vec![false, true]),
                (4, vec![true, true]),
                (6, vec![false, true]),
            ]
        );
    }
}
