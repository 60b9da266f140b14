//! Batch runs: a query file in, a TREC run file (and, with feedback, an expansion file) out.
//!
//! Query file: one `qid:query` per line (split at the first `:`), blank lines ignored.
//! Initial ranking file: run-file lines `qid Q0 docid rank score tag`, whitespace separated,
//! already in rank order.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

use crate::analyzer::Analyzer;
use crate::eval::EvalContext;
use crate::feedback::{self, Expansion};
use crate::index::Index;
use crate::params::Params;
use crate::parser::QueryParser;
use crate::ranking::{rank, RankedDoc, RunWriter, PLACEHOLDER_DOC};
use crate::Error;

/// A query of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Query id.
    pub id: String,
    /// Query text.
    pub text: String,
}

/// Parse a query file.
pub fn parse_query_file(text: &str) -> Result<Vec<Query>, Error> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((id, query)) = line.split_once(':') else {
            return Err(Error::Parse {
                query: line.to_string(),
                reason: "expected `qid:query`".to_string(),
            });
        };
        out.push(Query {
            id: id.trim().to_string(),
            text: query.trim().to_string(),
        });
    }
    Ok(out)
}

/// Parse an initial ranking file into per-query rankings, keyed by query id.
///
/// Lines of one query must be consecutive. Placeholder lines are skipped; any other unknown
/// document id is an error.
pub fn parse_initial_rankings(
    text: &str,
    index: &dyn Index,
) -> Result<HashMap<String, Vec<RankedDoc>>, Error> {
    let mut out: HashMap<String, Vec<RankedDoc>> = HashMap::new();
    let mut current: Option<String> = None;
    for (lineno, line) in text.lines().enumerate() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.is_empty() {
            continue;
        }
        let malformed = || Error::Parse {
            query: line.to_string(),
            reason: format!("line {}: expected `qid Q0 docid rank score tag`", lineno + 1),
        };
        if cols.len() < 5 {
            return Err(malformed());
        }
        let (qid, external_id) = (cols[0], cols[2]);
        let score: f64 = cols[4].parse().map_err(|_| malformed())?;

        if current.as_deref() != Some(qid) {
            if out.contains_key(qid) {
                return Err(Error::Parse {
                    query: line.to_string(),
                    reason: format!("line {}: query {qid} is not contiguous", lineno + 1),
                });
            }
            current = Some(qid.to_string());
        }
        let ranking = out.entry(qid.to_string()).or_default();
        if external_id == PLACEHOLDER_DOC {
            continue;
        }
        ranking.push(RankedDoc {
            doc_id: index.internal_id(external_id)?,
            external_id: external_id.to_string(),
            score,
        });
    }
    Ok(out)
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Queries read.
    pub queries: usize,
    /// Queries skipped because of an error.
    pub failed: usize,
    /// Queries expanded with feedback.
    pub expanded: usize,
}

/// Load the index named in `params` and run the batch.
#[cfg(feature = "persistence")]
pub fn run(params: &Params, fail_fast: bool) -> Result<RunSummary, Error> {
    let index = crate::index::MemoryIndex::load(&params.index_path)?;
    tracing::info!(
        path = %params.index_path.display(),
        docs = index.num_docs(),
        "loaded index"
    );
    let analyzer = *index.analyzer();
    run_with_index(params, &index, &analyzer, fail_fast)
}

/// Run every query of `params.query_file` against `index`.
///
/// A query that fails to parse or evaluate is logged and gets a placeholder line, unless
/// `fail_fast` is set. I/O errors and invalid operator arguments (including fields that
/// differ among proximity or synonym arguments) always abort the run.
pub fn run_with_index(
    params: &Params,
    index: &dyn Index,
    analyzer: &dyn Analyzer,
    fail_fast: bool,
) -> Result<RunSummary, Error> {
    let queries = parse_query_file(&std::fs::read_to_string(&params.query_file)?)?;

    let initial = match params.feedback.as_ref().and_then(|f| f.initial_ranking_file.as_ref()) {
        Some(path) => Some(parse_initial_rankings(&std::fs::read_to_string(path)?, index)?),
        None => None,
    };

    let mut run = RunWriter::new(
        BufWriter::new(File::create(&params.output_path)?),
        params.run_tag.clone(),
        params.output_length,
    );
    let mut expansions = match &params.feedback {
        Some(f) => Some(BufWriter::new(File::create(&f.expansion_file)?)),
        None => None,
    };

    let ctx = EvalContext::new(index, params.model);
    let parser = QueryParser::new(analyzer, &params.model);
    let mut summary = RunSummary {
        queries: queries.len(),
        ..RunSummary::default()
    };

    for q in &queries {
        let start = Instant::now();
        let result = match &params.feedback {
            None => evaluate(&ctx, &parser, &q.text).map(|r| (r, None)),
            Some(f) => {
                let initial_ranking = match &initial {
                    Some(map) => Ok(map.get(&q.id).cloned().unwrap_or_default()),
                    None => evaluate(&ctx, &parser, &q.text),
                };
                initial_ranking.and_then(|r| {
                    let fb = feedback::expand(&ctx, &parser, &q.text, &r, &f.config)?;
                    Ok((fb.ranking, Some(fb.expansion)))
                })
            }
        };

        match result {
            Ok((ranking, expansion)) => {
                run.write_query(&q.id, &ranking)?;
                if let (Some(out), Some(e)) = (expansions.as_mut(), expansion) {
                    write_expansion(out, &q.id, &e)?;
                    summary.expanded += 1;
                }
                tracing::info!(
                    qid = %q.id,
                    results = ranking.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "query done"
                );
            }
            Err(e) if fail_fast || is_fatal(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(qid = %q.id, error = %e, "query skipped");
                run.write_placeholder(&q.id)?;
                summary.failed += 1;
            }
        }
    }

    run.finish()?;
    if let Some(mut out) = expansions {
        out.flush()?;
    }
    tracing::info!(
        queries = summary.queries,
        failed = summary.failed,
        expanded = summary.expanded,
        "run finished"
    );
    Ok(summary)
}

fn is_fatal(e: &Error) -> bool {
    matches!(
        e,
        Error::Io(_) | Error::FieldMismatch { .. } | Error::InvalidArgument { .. }
    )
}

fn evaluate(ctx: &EvalContext<'_>, parser: &QueryParser<'_>, text: &str) -> Result<Vec<RankedDoc>, Error> {
    let tree = parser.parse(text)?;
    tracing::debug!(query = %tree, "parsed");
    rank(ctx.index(), &ctx.evaluate(&tree)?)
}

fn write_expansion(out: &mut impl Write, query_id: &str, expansion: &Expansion) -> Result<(), Error> {
    writeln!(out, "{query_id}: {expansion}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::EnglishAnalyzer;
    use crate::feedback::FeedbackConfig;
    use crate::index::MemoryIndex;
    use crate::model::{IndriParams, RetrievalModel};
    use crate::params::FeedbackParams;
    use std::path::Path;

    fn toy() -> MemoryIndex {
        let corpus = "a1\tapple banana apple\nb2\tbanana cherry\nc3\tcherry date\n";
        MemoryIndex::from_corpus(corpus, EnglishAnalyzer::unstemmed()).unwrap()
    }

    fn params(dir: &Path, model: RetrievalModel) -> Params {
        Params {
            index_path: dir.join("index.bin"),
            query_file: dir.join("queries.txt"),
            output_path: dir.join("run.txt"),
            model,
            output_length: 100,
            run_tag: "test".to_string(),
            feedback: None,
        }
    }

    #[test]
    fn query_file_splits_at_first_colon() {
        let qs = parse_query_file("1: apple\n\n2:#near/1(a b):x\n").unwrap();
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].text, "apple");
        assert_eq!(qs[1].id, "2");
        assert_eq!(qs[1].text, "#near/1(a b):x");
        assert!(parse_query_file("no colon").is_err());
    }

    #[test]
    fn initial_rankings_group_by_query() {
        let ix = toy();
        let text = "1 Q0 b2 1 0.9 t\n1 Q0 a1 2 0.5 t\n2 Q0 dummy 1 0 t\n";
        let got = parse_initial_rankings(text, &ix).unwrap();
        assert_eq!(got["1"].len(), 2);
        assert_eq!(got["1"][0].external_id, "b2");
        assert_eq!(got["1"][0].doc_id, 1);
        assert!(got["2"].is_empty());

        let err = parse_initial_rankings("1 Q0 zz 1 0.9 t\n", &ix).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = parse_initial_rankings("1 Q0 a1 1 x t\n", &ix).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        let err = parse_initial_rankings("1 Q0 a1 1 1 t\n2 Q0 a1 1 1 t\n1 Q0 b2 2 1 t\n", &ix)
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn bad_query_gets_placeholder_unless_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let ix = toy();
        std::fs::write(dir.path().join("queries.txt"), "1:#and(apple\n2:cherry\n").unwrap();
        let p = params(dir.path(), RetrievalModel::RankedBoolean);

        let summary = run_with_index(&p, &ix, ix.analyzer(), false).unwrap();
        assert_eq!(summary.queries, 2);
        assert_eq!(summary.failed, 1);
        let run = std::fs::read_to_string(&p.output_path).unwrap();
        assert_eq!(
            run,
            "1\tQ0\tdummy\t1\t0\ttest\n2\tQ0\tb2\t1\t1\ttest\n2\tQ0\tc3\t2\t1\ttest\n"
        );

        let err = run_with_index(&p, &ix, ix.analyzer(), true).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn mixed_proximity_fields_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let ix = toy();
        std::fs::write(
            dir.path().join("queries.txt"),
            "1:#near/1(apple banana.title)\n2:cherry\n",
        )
        .unwrap();
        let p = params(dir.path(), RetrievalModel::RankedBoolean);

        let err = run_with_index(&p, &ix, ix.analyzer(), false).unwrap_err();
        assert!(matches!(err, Error::FieldMismatch { .. }), "{err}");

        std::fs::write(dir.path().join("queries.txt"), "1:#near/1(apple #and(banana))\n").unwrap();
        let err = run_with_index(&p, &ix, ix.analyzer(), false).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }), "{err}");
    }

    #[test]
    fn feedback_run_writes_expansions() {
        let dir = tempfile::tempdir().unwrap();
        let ix = toy();
        std::fs::write(dir.path().join("queries.txt"), "7:apple\n").unwrap();
        let mut p = params(dir.path(), RetrievalModel::Indri(IndriParams::default()));
        p.feedback = Some(FeedbackParams {
            config: FeedbackConfig {
                docs: 1,
                terms: 1,
                mu: 0.0,
                orig_weight: 0.5,
            },
            expansion_file: dir.path().join("exp.txt"),
            initial_ranking_file: None,
        });

        let summary = run_with_index(&p, &ix, ix.analyzer(), true).unwrap();
        assert_eq!(summary.expanded, 1);
        let exp = std::fs::read_to_string(dir.path().join("exp.txt")).unwrap();
        assert!(exp.starts_with("7: #wand("), "{exp}");
        assert!(exp.trim_end().ends_with(" apple)"), "{exp}");
        let run = std::fs::read_to_string(&p.output_path).unwrap();
        assert!(run.starts_with("7\tQ0\ta1\t1\t"), "{run}");
    }

    #[test]
    fn feedback_from_initial_ranking_file() {
        let dir = tempfile::tempdir().unwrap();
        let ix = toy();
        std::fs::write(dir.path().join("queries.txt"), "7:cherry\n8:date\n").unwrap();
        std::fs::write(dir.path().join("init.txt"), "7 Q0 b2 1 0.5 x\n").unwrap();
        let mut p = params(dir.path(), RetrievalModel::Indri(IndriParams::default()));
        p.feedback = Some(FeedbackParams {
            config: FeedbackConfig {
                docs: 5,
                terms: 2,
                mu: 0.0,
                orig_weight: 0.3,
            },
            expansion_file: dir.path().join("exp.txt"),
            initial_ranking_file: Some(dir.path().join("init.txt")),
        });

        let summary = run_with_index(&p, &ix, ix.analyzer(), true).unwrap();
        assert_eq!(summary.expanded, 2);
        let exp = std::fs::read_to_string(dir.path().join("exp.txt")).unwrap();
        let lines: Vec<&str> = exp.lines().collect();
        assert!(lines[0].starts_with("7: #wand("));
        // No initial ranking for query 8: nothing to expand from.
        assert_eq!(lines[1], "8: #wand()");
        let run = std::fs::read_to_string(&p.output_path).unwrap();
        assert!(run.contains("8\tQ0\tdummy\t1\t0\ttest"), "{run}");
    }
}
