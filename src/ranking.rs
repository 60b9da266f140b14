//! Final ranking and TREC run output.
//!
//! Order: score descending, then external id ascending. Internal ids never affect the order,
//! so the same collection indexed in a different order yields the same run.

use std::io::Write;

use crate::index::Index;
use crate::postings::DocId;
use crate::score_list::ScoreList;
use crate::Error;

/// Default number of ranked documents written per query.
pub const DEFAULT_OUTPUT_LENGTH: usize = 100;

/// Default run tag (last column of a run line).
pub const DEFAULT_RUN_TAG: &str = "structir";

/// Document id written for a query with no results.
pub const PLACEHOLDER_DOC: &str = "dummy";

/// A ranked document.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDoc {
    /// Internal document id.
    pub doc_id: DocId,
    /// External document id.
    pub external_id: String,
    /// Score.
    pub score: f64,
}

/// Rank a score list: resolve external ids, then sort by score descending, external id ascending.
pub fn rank(index: &dyn Index, list: &ScoreList) -> Result<Vec<RankedDoc>, Error> {
    let mut out = Vec::with_capacity(list.len());
    for e in &list.entries {
        out.push(RankedDoc {
            doc_id: e.doc_id,
            external_id: index.external_id(e.doc_id)?,
            score: e.score,
        });
    }
    sort_ranking(&mut out);
    Ok(out)
}

/// Sort in ranking order (score descending, external id ascending).
pub fn sort_ranking(docs: &mut [RankedDoc]) {
    docs.sort_unstable_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.external_id.cmp(&b.external_id))
    });
}

/// Writes run lines: `qid Q0 docid rank score tag`, tab separated.
pub struct RunWriter<W: Write> {
    out: W,
    run_tag: String,
    length: usize,
}

impl<W: Write> RunWriter<W> {
    /// Writer keeping at most `length` documents per query.
    pub fn new(out: W, run_tag: impl Into<String>, length: usize) -> Self {
        Self {
            out,
            run_tag: run_tag.into(),
            length,
        }
    }

    /// Write one query's ranking; an empty ranking writes a single placeholder line.
    pub fn write_query(&mut self, query_id: &str, ranking: &[RankedDoc]) -> Result<(), Error> {
        if ranking.is_empty() {
            self.write_placeholder(query_id)?;
            return Ok(());
        }
        for (i, doc) in ranking.iter().take(self.length).enumerate() {
            writeln!(
                self.out,
                "{query_id}\tQ0\t{}\t{}\t{}\t{}",
                doc.external_id,
                i + 1,
                doc.score,
                self.run_tag
            )?;
        }
        Ok(())
    }

    /// Write the placeholder line used for queries without results (or that failed).
    pub fn write_placeholder(&mut self, query_id: &str) -> Result<(), Error> {
        writeln!(
            self.out,
            "{query_id}\tQ0\t{PLACEHOLDER_DOC}\t1\t0\t{}",
            self.run_tag
        )?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W, Error> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::EnglishAnalyzer;
    use crate::index::MemoryIndex;

    fn doc(id: &str, score: f64) -> RankedDoc {
        RankedDoc {
            doc_id: 0,
            external_id: id.to_string(),
            score,
        }
    }

    #[test]
    fn ties_break_by_external_id() {
        let mut docs = vec![doc("b", 1.0), doc("c", 2.0), doc("a", 1.0), doc("aa", 1.0)];
        sort_ranking(&mut docs);
        let ids: Vec<&str> = docs.iter().map(|d| d.external_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "aa", "b"]);
    }

    #[test]
    fn rank_ignores_internal_ids() {
        let mut ix = MemoryIndex::new(EnglishAnalyzer::default());
        for id in ["z", "m", "a"] {
            ix.add_document(id, &[("body", "word")]).unwrap();
        }
        let list: ScoreList = [(0, 0.5), (1, 0.5), (2, 0.5)].into_iter().collect();
        let ranked = rank(&ix, &list).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|d| d.external_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "m", "z"]);
    }

    #[test]
    fn rank_unknown_doc_is_not_found() {
        let ix = MemoryIndex::new(EnglishAnalyzer::default());
        let list: ScoreList = [(7, 1.0)].into_iter().collect();
        assert!(matches!(rank(&ix, &list), Err(Error::NotFound(_))));
    }

    #[test]
    fn writer_truncates_and_numbers_from_one() {
        let docs: Vec<RankedDoc> = (0..5).map(|i| doc(&format!("d{i}"), 5.0 - i as f64)).collect();
        let mut w = RunWriter::new(Vec::new(), "tag", 3);
        w.write_query("7", &docs).unwrap();
        let text = String::from_utf8(w.finish().unwrap()).unwrap();
        assert_eq!(text, "7\tQ0\td0\t1\t5\ttag\n7\tQ0\td1\t2\t4\ttag\n7\tQ0\td2\t3\t3\ttag\n");
    }

    #[test]
    fn empty_ranking_writes_placeholder() {
        let mut w = RunWriter::new(Vec::new(), DEFAULT_RUN_TAG, DEFAULT_OUTPUT_LENGTH);
        w.write_query("12", &[]).unwrap();
        let text = String::from_utf8(w.finish().unwrap()).unwrap();
        assert_eq!(text, "12\tQ0\tdummy\t1\t0\tstructir\n");
    }

    #[test]
    fn rerunning_is_byte_identical() {
        let docs = vec![doc("x", 0.25), doc("y", 0.25), doc("w", 0.5)];
        let render = |mut d: Vec<RankedDoc>| {
            sort_ranking(&mut d);
            let mut w = RunWriter::new(Vec::new(), "t", 100);
            w.write_query("1", &d).unwrap();
            w.finish().unwrap()
        };
        let mut reversed = docs.clone();
        reversed.reverse();
        assert_eq!(render(docs), render(reversed));
    }
}
