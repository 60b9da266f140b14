//! Query language parser.
//!
//! ```text
//! Query   := Expr | bare terms
//! Expr    := '#' OpName '(' ArgList ')'
//! OpName  := and | or | syn | sum | wand | wsum | near/N | window/N     (case-insensitive)
//! ArgList := (Weight? (Expr | Term))*          Weight only (and always) inside wand/wsum
//! Term    := surface['.'field]
//! ```
//!
//! The query is always wrapped in the model's default operator (`#and`, or `#sum` for BM25);
//! for a query that is already structured this adds a single-argument root, which does not
//! change results. Surface terms go through the [`Analyzer`]; a term that analyzes to nothing
//! (a stopword) is dropped, and an operator left without arguments is dropped too.
//!
//! The parser is a state machine over `(operator stack, pending weight)`.

use crate::analyzer::Analyzer;
use crate::index::DEFAULT_FIELD;
use crate::model::RetrievalModel;
use crate::query::{normalize, OpKind, QueryArg, QueryNode, ScoreNode};
use crate::Error;

/// Operator an unstructured query is wrapped in.
pub fn default_operator(model: &RetrievalModel) -> OpKind {
    match model {
        RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean => OpKind::And,
        RetrievalModel::Bm25(_) => OpKind::Sum,
        RetrievalModel::Indri(_) => OpKind::And,
    }
}

/// Parses query text into operator trees.
pub struct QueryParser<'a> {
    analyzer: &'a dyn Analyzer,
    default_op: OpKind,
}

struct Frame {
    kind: OpKind,
    // Weight this operator carries in its (weighted) parent.
    weight: Option<f64>,
    args: Vec<QueryArg>,
}

impl<'a> QueryParser<'a> {
    /// Parser for queries evaluated under `model`.
    pub fn new(analyzer: &'a dyn Analyzer, model: &RetrievalModel) -> Self {
        Self {
            analyzer,
            default_op: default_operator(model),
        }
    }

    /// Parse and normalize `text` into an evaluable tree.
    pub fn parse(&self, text: &str) -> Result<ScoreNode, Error> {
        normalize(self.parse_syntax(text)?)
    }

    /// Parse `text` into a syntax tree without normalizing it.
    pub fn parse_syntax(&self, text: &str) -> Result<QueryNode, Error> {
        let trimmed = text.trim();
        let wrapped = format!("{}({})", self.default_op, trimmed);
        let fail = |reason: String| Error::Parse {
            query: trimmed.to_string(),
            reason,
        };

        let mut stack: Vec<Frame> = Vec::new();
        let mut pending_weight: Option<f64> = None;
        let mut root: Option<Frame> = None;
        let mut expect_open = false;

        for token in tokenize(&wrapped) {
            if root.is_some() {
                return Err(fail(format!("unexpected `{token}` after the query closed")));
            }
            if expect_open {
                if token != "(" {
                    return Err(fail(format!("expected `(` before `{token}`")));
                }
                expect_open = false;
                continue;
            }

            match token {
                "(" => return Err(fail("unexpected `(`".to_string())),
                ")" => {
                    let Some(frame) = stack.pop() else {
                        return Err(fail("unbalanced `)`".to_string()));
                    };
                    if pending_weight.is_some() {
                        return Err(Error::InvalidWeight {
                            op: frame.kind.to_string(),
                            reason: "weight is not followed by an argument".to_string(),
                        });
                    }
                    match stack.last_mut() {
                        None => root = Some(frame),
                        Some(parent) => {
                            // Operators emptied by stopword removal are dropped.
                            if !frame.args.is_empty() {
                                parent.args.push(QueryArg {
                                    weight: frame.weight,
                                    node: QueryNode::Op {
                                        kind: frame.kind,
                                        args: frame.args,
                                    },
                                });
                            }
                        }
                    }
                }
                t if t.starts_with('#') => {
                    let kind = OpKind::from_token(t)?
                        .ok_or_else(|| fail(format!("unknown operator `{t}`")))?;
                    let weight = match stack.last() {
                        Some(top) if top.kind.is_weighted() => {
                            Some(pending_weight.take().ok_or_else(|| Error::InvalidWeight {
                                op: top.kind.to_string(),
                                reason: format!("missing weight before `{t}`"),
                            })?)
                        }
                        _ => None,
                    };
                    stack.push(Frame {
                        kind,
                        weight,
                        args: Vec::new(),
                    });
                    expect_open = true;
                }
                t => {
                    let Some(top) = stack.last_mut() else {
                        return Err(fail(format!("term `{t}` outside of an operator")));
                    };
                    if top.kind.is_weighted() && pending_weight.is_none() {
                        let w = t.parse::<f64>().map_err(|_| Error::InvalidWeight {
                            op: top.kind.to_string(),
                            reason: format!("expected a weight, found `{t}`"),
                        })?;
                        pending_weight = Some(w);
                        continue;
                    }
                    let weight = pending_weight.take();
                    if let Some(node) = self.term(t) {
                        top.args.push(QueryArg { weight, node });
                    }
                }
            }
        }

        if expect_open || !stack.is_empty() {
            return Err(fail("missing `)`".to_string()));
        }
        let Some(root) = root else {
            return Err(Error::EmptyQuery);
        };
        if root.args.is_empty() {
            return Err(Error::EmptyQuery);
        }
        Ok(QueryNode::Op {
            kind: root.kind,
            args: root.args,
        })
    }

    // `surface` or `surface.field`; `None` when the analyzer drops the surface text.
    fn term(&self, token: &str) -> Option<QueryNode> {
        let (surface, field) = match token.split_once('.') {
            Some((s, f)) if !f.is_empty() && !f.contains('.') => (s, f),
            _ => (token, DEFAULT_FIELD),
        };
        let term = self.analyzer.analyze(surface).into_iter().next()?;
        Some(QueryNode::Term {
            term,
            field: field.to_string(),
        })
    }
}

// Whitespace and commas separate tokens; parentheses are tokens of their own.
fn tokenize(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        let is_sep = c.is_whitespace() || c == ',';
        let is_paren = c == '(' || c == ')';
        if is_sep || is_paren {
            if let Some(s) = start.take() {
                out.push(&text[s..i]);
            }
            if is_paren {
                out.push(&text[i..i + 1]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push(&text[s..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::EnglishAnalyzer;
    use crate::model::{Bm25Params, IndriParams};
    use crate::query::{ListNode, Weighted};

    fn indri() -> RetrievalModel {
        RetrievalModel::Indri(IndriParams::default())
    }

    fn t(term: &str) -> ScoreNode {
        ScoreNode::Score(ListNode::Term {
            term: term.to_string(),
            field: "body".to_string(),
        })
    }

    #[test]
    fn tokenizer_splits_parens_and_commas() {
        assert_eq!(
            tokenize("#and(a, b.title)"),
            vec!["#and", "(", "a", "b.title", ")"]
        );
    }

    #[test]
    fn bare_query_gets_model_default_operator() {
        let a = EnglishAnalyzer::default();
        let bm25 = RetrievalModel::Bm25(Bm25Params::default());
        let tree = QueryParser::new(&a, &bm25).parse("Apples oranges").unwrap();
        assert_eq!(tree, ScoreNode::Sum(vec![t("apple"), t("orange")]));

        let tree = QueryParser::new(&a, &RetrievalModel::RankedBoolean)
            .parse("apple")
            .unwrap();
        assert_eq!(tree, ScoreNode::And(vec![t("apple")]));
    }

    #[test]
    fn structured_query_is_wrapped_once() {
        let a = EnglishAnalyzer::default();
        let m = indri();
        let tree = QueryParser::new(&a, &m)
            .parse("#OR(cat #NEAR/2(big dog.title))")
            .unwrap_err();
        // #near/2 mixes body and title.
        assert!(matches!(tree, Error::FieldMismatch { .. }));

        let tree = QueryParser::new(&a, &m)
            .parse("#and(cat #window/3(big dog))")
            .unwrap();
        assert_eq!(tree.to_string(), "#and(#and(cat.body #window/3(big.body dog.body)))");
    }

    #[test]
    fn weights_pair_with_following_argument() {
        let a = EnglishAnalyzer::default();
        let m = indri();
        let tree = QueryParser::new(&a, &m)
            .parse("#wand(0.7 cat 0.3 #and(dog 2020))")
            .unwrap();
        let ScoreNode::And(root) = tree else {
            panic!("expected wrapper");
        };
        assert_eq!(
            root[0],
            ScoreNode::Wand(vec![
                Weighted {
                    weight: 0.7,
                    node: t("cat")
                },
                Weighted {
                    weight: 0.3,
                    node: ScoreNode::And(vec![t("dog"), t("2020")]),
                },
            ])
        );
    }

    #[test]
    fn stopwords_drop_argument_and_its_weight() {
        let a = EnglishAnalyzer::default();
        let m = indri();
        let tree = QueryParser::new(&a, &m)
            .parse("#wand(0.5 the 0.5 cat) #syn(of the)")
            .unwrap();
        let ScoreNode::And(root) = tree else {
            panic!("expected wrapper");
        };
        assert_eq!(root.len(), 1, "emptied #syn is dropped");
        assert_eq!(
            root[0],
            ScoreNode::Wand(vec![Weighted {
                weight: 0.5,
                node: t("cat")
            }])
        );
    }

    #[test]
    fn all_stopwords_is_empty_query() {
        let a = EnglishAnalyzer::default();
        let err = QueryParser::new(&a, &indri()).parse("the of and").unwrap_err();
        assert!(matches!(err, Error::EmptyQuery));
    }

    #[test]
    fn malformed_queries_report_text() {
        let a = EnglishAnalyzer::default();
        let m = indri();
        let p = QueryParser::new(&a, &m);

        let err = p.parse("#and(cat dog").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("#and(cat dog"), "{err}");

        let err = p.parse("#and(cat)) dog").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "{err}");

        let err = p.parse("#frobnicate(cat)").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "{err}");

        let err = p.parse("#and cat").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "{err}");
    }

    #[test]
    fn weight_errors() {
        let a = EnglishAnalyzer::default();
        let m = indri();
        let p = QueryParser::new(&a, &m);
        assert!(matches!(
            p.parse("#wand(cat dog)"),
            Err(Error::InvalidWeight { .. })
        ));
        assert!(matches!(
            p.parse("#wand(0.5 cat 0.5)"),
            Err(Error::InvalidWeight { .. })
        ));
        assert!(matches!(
            p.parse("#wsum(#and(cat) 1 dog)"),
            Err(Error::InvalidWeight { .. })
        ));
    }

    #[test]
    fn rendering_round_trips() {
        let a = EnglishAnalyzer::default();
        let m = indri();
        let p = QueryParser::new(&a, &m);
        let tree = p
            .parse("#wsum(0.25 #syn(cat kitten) 0.75 #near/1(black cat.body) 1e-3 dog.title)")
            .unwrap();
        let again = p.parse(&tree.to_string()).unwrap();
        // Re-parsing adds one more single-argument root.
        assert_eq!(again, ScoreNode::And(vec![tree]));
    }
}
