//! Query operator trees.
//!
//! The parser produces a [`QueryNode`] syntax tree. [`normalize`] turns it, once, into the typed
//! tree that evaluation walks:
//! - [`ListNode`]: operators that produce positional inverted lists (term, `#syn`, `#near/N`,
//!   `#window/N`);
//! - [`ScoreNode`]: operators that produce score lists (`#score`, `#and`, `#or`, `#sum`, `#wand`,
//!   `#wsum`).
//!
//! Every list-producing node that appears where a score is needed is wrapped in
//! [`ScoreNode::Score`] here, so evaluation never has to rewrite the tree.
//!
//! Both trees render back to query text (`Display`); parsing that text again yields an
//! equivalent tree.

use std::fmt;

use crate::Error;

/// Operator names of the query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// `#and`
    And,
    /// `#or`
    Or,
    /// `#sum`
    Sum,
    /// `#wand`
    Wand,
    /// `#wsum`
    Wsum,
    /// `#syn`
    Syn,
    /// `#near/N`
    Near(u32),
    /// `#window/N`
    Window(u32),
}

impl OpKind {
    /// Parse an operator token such as `#AND` or `#near/3` (case-insensitive).
    ///
    /// Returns `None` for unknown names; a malformed `/N` suffix is an error.
    pub fn from_token(token: &str) -> Result<Option<Self>, Error> {
        let lower = token.to_ascii_lowercase();
        let kind = match lower.as_str() {
            "#and" => Self::And,
            "#or" => Self::Or,
            "#sum" => Self::Sum,
            "#wand" => Self::Wand,
            "#wsum" => Self::Wsum,
            "#syn" => Self::Syn,
            _ => {
                if let Some(n) = lower.strip_prefix("#near/") {
                    Self::Near(parse_distance(token, n)?)
                } else if let Some(n) = lower.strip_prefix("#window/") {
                    Self::Window(parse_distance(token, n)?)
                } else {
                    return Ok(None);
                }
            }
        };
        Ok(Some(kind))
    }

    /// Whether every argument of this operator is preceded by a weight.
    pub fn is_weighted(&self) -> bool {
        matches!(self, Self::Wand | Self::Wsum)
    }

    /// Whether this operator produces an inverted list.
    pub fn is_list_producing(&self) -> bool {
        matches!(self, Self::Syn | Self::Near(_) | Self::Window(_))
    }
}

fn parse_distance(token: &str, n: &str) -> Result<u32, Error> {
    match n.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Parse {
            query: token.to_string(),
            reason: "distance must be a positive integer".to_string(),
        }),
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("#and"),
            Self::Or => f.write_str("#or"),
            Self::Sum => f.write_str("#sum"),
            Self::Wand => f.write_str("#wand"),
            Self::Wsum => f.write_str("#wsum"),
            Self::Syn => f.write_str("#syn"),
            Self::Near(n) => write!(f, "#near/{n}"),
            Self::Window(n) => write!(f, "#window/{n}"),
        }
    }
}

/// An argument in the syntax tree, with the weight that preceded it (weighted operators only).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArg {
    /// Weight written before the argument.
    pub weight: Option<f64>,
    /// The argument itself.
    pub node: QueryNode,
}

/// Query syntax tree, as parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// An analyzed term in a field.
    Term {
        /// Analyzed term.
        term: String,
        /// Field name.
        field: String,
    },
    /// An operator and its arguments.
    Op {
        /// Operator.
        kind: OpKind,
        /// Arguments, in order.
        args: Vec<QueryArg>,
    },
}

/// Operators producing positional inverted lists.
#[derive(Debug, Clone, PartialEq)]
pub enum ListNode {
    /// Raw postings of one term.
    Term {
        /// Analyzed term.
        term: String,
        /// Field name.
        field: String,
    },
    /// Union of positions.
    Syn(Vec<ListNode>),
    /// Ordered proximity: each argument within `distance` positions after the previous one.
    Near {
        /// Maximum gap between consecutive arguments.
        distance: u32,
        /// Arguments, in match order.
        args: Vec<ListNode>,
    },
    /// Unordered proximity: all arguments within a span of `width` positions.
    Window {
        /// Maximum span (`max - min + 1`).
        width: u32,
        /// Arguments.
        args: Vec<ListNode>,
    },
}

impl ListNode {
    /// Field of the list this node produces (the first argument's field for operators).
    pub fn field(&self) -> &str {
        match self {
            Self::Term { field, .. } => field,
            Self::Syn(args) | Self::Near { args, .. } | Self::Window { args, .. } => {
                args.first().map_or("", ListNode::field)
            }
        }
    }

    /// Operator name, for messages.
    pub fn name(&self) -> String {
        match self {
            Self::Term { term, field } => format!("{term}.{field}"),
            Self::Syn(_) => OpKind::Syn.to_string(),
            Self::Near { distance, .. } => OpKind::Near(*distance).to_string(),
            Self::Window { width, .. } => OpKind::Window(*width).to_string(),
        }
    }
}

/// A score-producing child of `#wand`/`#wsum` with its weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Weighted {
    /// Unnormalized weight.
    pub weight: f64,
    /// Child operator.
    pub node: ScoreNode,
}

/// Operators producing score lists.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreNode {
    /// Converts an inverted list into a score list under the active model.
    Score(ListNode),
    /// Conjunction (Boolean) / geometric mean (Indri).
    And(Vec<ScoreNode>),
    /// Disjunction (Boolean models).
    Or(Vec<ScoreNode>),
    /// Sum of scores (BM25).
    Sum(Vec<ScoreNode>),
    /// Weighted geometric mean (Indri).
    Wand(Vec<Weighted>),
    /// Weighted arithmetic mean (Indri).
    Wsum(Vec<Weighted>),
}

impl ScoreNode {
    /// Operator name, for messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Score(_) => "#score",
            Self::And(_) => "#and",
            Self::Or(_) => "#or",
            Self::Sum(_) => "#sum",
            Self::Wand(_) => "#wand",
            Self::Wsum(_) => "#wsum",
        }
    }
}

/// Turn a syntax tree into a typed operator tree.
///
/// Validates operator arguments (list operators take only list-producing arguments that share
/// one field; weighted operators need non-negative weights with a positive sum) and wraps
/// list-producing nodes that need scores in [`ScoreNode::Score`].
pub fn normalize(node: QueryNode) -> Result<ScoreNode, Error> {
    match node {
        QueryNode::Term { .. } => Ok(ScoreNode::Score(to_list(node)?)),
        QueryNode::Op { kind, .. } if kind.is_list_producing() => {
            Ok(ScoreNode::Score(to_list(node)?))
        }
        QueryNode::Op { kind, args } => {
            if args.is_empty() {
                return Err(Error::InvalidArgument {
                    op: kind.to_string(),
                    reason: "operator has no arguments".to_string(),
                });
            }
            if kind.is_weighted() {
                let mut total = 0.0;
                let mut children = Vec::with_capacity(args.len());
                for arg in args {
                    let weight = arg.weight.ok_or_else(|| Error::InvalidWeight {
                        op: kind.to_string(),
                        reason: "argument without a weight".to_string(),
                    })?;
                    if !weight.is_finite() || weight < 0.0 {
                        return Err(Error::InvalidWeight {
                            op: kind.to_string(),
                            reason: format!("weight {weight} is not a non-negative number"),
                        });
                    }
                    total += weight;
                    children.push(Weighted {
                        weight,
                        node: normalize(arg.node)?,
                    });
                }
                if total <= 0.0 {
                    return Err(Error::InvalidWeight {
                        op: kind.to_string(),
                        reason: "weights sum to zero".to_string(),
                    });
                }
                return Ok(match kind {
                    OpKind::Wand => ScoreNode::Wand(children),
                    _ => ScoreNode::Wsum(children),
                });
            }
            let children = args
                .into_iter()
                .map(|a| normalize(a.node))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match kind {
                OpKind::And => ScoreNode::And(children),
                OpKind::Or => ScoreNode::Or(children),
                _ => ScoreNode::Sum(children),
            })
        }
    }
}

fn to_list(node: QueryNode) -> Result<ListNode, Error> {
    match node {
        QueryNode::Term { term, field } => Ok(ListNode::Term { term, field }),
        QueryNode::Op { kind, args } => {
            if !kind.is_list_producing() {
                return Err(Error::InvalidArgument {
                    op: kind.to_string(),
                    reason: "a score operator cannot be used where an inverted list is required"
                        .to_string(),
                });
            }
            if args.is_empty() {
                return Err(Error::InvalidArgument {
                    op: kind.to_string(),
                    reason: "operator has no arguments".to_string(),
                });
            }
            let mut children = Vec::with_capacity(args.len());
            for arg in args {
                if let QueryNode::Op { kind: inner, .. } = &arg.node {
                    if !inner.is_list_producing() {
                        return Err(Error::InvalidArgument {
                            op: kind.to_string(),
                            reason: format!("argument {inner} is not an inverted-list operator"),
                        });
                    }
                }
                children.push(to_list(arg.node)?);
            }
            let expected = children[0].field().to_string();
            if let Some(other) = children.iter().find(|c| c.field() != expected) {
                return Err(Error::FieldMismatch {
                    op: kind.to_string(),
                    expected,
                    found: other.field().to_string(),
                });
            }
            match kind {
                OpKind::Syn => Ok(ListNode::Syn(children)),
                OpKind::Near(distance) => Ok(ListNode::Near {
                    distance,
                    args: children,
                }),
                OpKind::Window(width) => Ok(ListNode::Window {
                    width,
                    args: children,
                }),
                other => Err(Error::InvalidArgument {
                    op: other.to_string(),
                    reason: "not an inverted-list operator".to_string(),
                }),
            }
        }
    }
}

fn write_args<T: fmt::Display>(f: &mut fmt::Formatter<'_>, op: &str, args: &[T]) -> fmt::Result {
    write!(f, "{op}(")?;
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{a}")?;
    }
    f.write_str(")")
}

impl fmt::Display for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term { term, field } => write!(f, "{term}.{field}"),
            Self::Syn(args) => write_args(f, "#syn", args),
            Self::Near { distance, args } => write_args(f, &format!("#near/{distance}"), args),
            Self::Window { width, args } => write_args(f, &format!("#window/{width}"), args),
        }
    }
}

impl fmt::Display for Weighted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.weight, self.node)
    }
}

impl fmt::Display for ScoreNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // The implicit #score wrapper is not part of the query language.
            Self::Score(list) => write!(f, "{list}"),
            Self::And(args) => write_args(f, "#and", args),
            Self::Or(args) => write_args(f, "#or", args),
            Self::Sum(args) => write_args(f, "#sum", args),
            Self::Wand(args) => write_args(f, "#wand", args),
            Self::Wsum(args) => write_args(f, "#wsum", args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(t: &str, field: &str) -> QueryNode {
        QueryNode::Term {
            term: t.to_string(),
            field: field.to_string(),
        }
    }

    fn op(kind: OpKind, args: Vec<QueryNode>) -> QueryNode {
        QueryNode::Op {
            kind,
            args: args
                .into_iter()
                .map(|node| QueryArg { weight: None, node })
                .collect(),
        }
    }

    #[test]
    fn list_leaves_are_wrapped_in_score() {
        let tree = normalize(op(
            OpKind::And,
            vec![
                term("a", "body"),
                op(OpKind::Near(2), vec![term("b", "body"), term("c", "body")]),
            ],
        ))
        .unwrap();
        let ScoreNode::And(children) = &tree else {
            panic!("expected #and, got {tree:?}");
        };
        assert!(matches!(children[0], ScoreNode::Score(ListNode::Term { .. })));
        assert!(matches!(children[1], ScoreNode::Score(ListNode::Near { distance: 2, .. })));
        assert_eq!(tree.to_string(), "#and(a.body #near/2(b.body c.body))");
    }

    #[test]
    fn proximity_rejects_score_arguments() {
        let err = normalize(op(
            OpKind::Window(3),
            vec![term("a", "body"), op(OpKind::And, vec![term("b", "body")])],
        ))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }), "{err}");
    }

    #[test]
    fn proximity_rejects_mixed_fields() {
        let err = normalize(op(
            OpKind::Syn,
            vec![term("a", "body"), term("a", "title")],
        ))
        .unwrap_err();
        assert!(matches!(err, Error::FieldMismatch { .. }), "{err}");
    }

    #[test]
    fn weighted_operators_need_positive_total() {
        let node = QueryNode::Op {
            kind: OpKind::Wand,
            args: vec![QueryArg {
                weight: Some(0.0),
                node: term("a", "body"),
            }],
        };
        assert!(matches!(normalize(node), Err(Error::InvalidWeight { .. })));
    }

    #[test]
    fn operator_tokens() {
        assert_eq!(OpKind::from_token("#AND").unwrap(), Some(OpKind::And));
        assert_eq!(OpKind::from_token("#Near/7").unwrap(), Some(OpKind::Near(7)));
        assert_eq!(OpKind::from_token("#window/2").unwrap(), Some(OpKind::Window(2)));
        assert_eq!(OpKind::from_token("#boost").unwrap(), None);
        assert!(OpKind::from_token("#near/0").is_err());
        assert!(matches!(
            OpKind::from_token("#near/x"),
            Err(Error::Parse { .. })
        ));
    }
}
