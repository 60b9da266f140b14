//! Retrieval models: the closed set of scoring configurations consulted by every operator.
//!
//! A model is a passive value: parameters plus the scoring kernels below. Operators dispatch on
//! the variant with `match`; a model never carries per-query state.
//!
//! References:
//! - Robertson & Zaragoza (2009). "The Probabilistic Relevance Framework: BM25 and Beyond."
//! - Metzler & Croft (2004). "Combining the language model and inference network approaches."
//! - Zhai & Lafferty (2001). Dirichlet prior smoothing for document language models.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation parameter.
    pub k1: f64,
    /// Length normalization parameter.
    pub b: f64,
    /// Query-term frequency saturation. Every query term carries qtf = 1, so the
    /// `(k3 + 1) qtf / (k3 + qtf)` factor is always 1; the value is kept for completeness.
    pub k3: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            k3: 0.0,
        }
    }
}

/// Indri (Dirichlet-smoothed, linearly interpolated) language-model parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndriParams {
    /// Dirichlet prior strength.
    pub mu: u32,
    /// Weight of the collection model in the final interpolation.
    pub lambda: f64,
}

impl Default for IndriParams {
    fn default() -> Self {
        Self {
            mu: 2500,
            lambda: 0.4,
        }
    }
}

/// Retrieval model selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetrievalModel {
    /// Exact-match Boolean; every match scores 1.0.
    UnrankedBoolean,
    /// Boolean matching with tf-based scores (min for AND, max for OR).
    RankedBoolean,
    /// Okapi BM25.
    Bm25(Bm25Params),
    /// Indri query-likelihood language model.
    Indri(IndriParams),
}

impl RetrievalModel {
    /// Model name as written in parameter files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnrankedBoolean => "UnrankedBoolean",
            Self::RankedBoolean => "RankedBoolean",
            Self::Bm25(_) => "BM25",
            Self::Indri(_) => "Indri",
        }
    }

    /// Names of the parameters this model requires.
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            Self::UnrankedBoolean | Self::RankedBoolean => &[],
            Self::Bm25(_) => &["k_1", "b", "k_3"],
            Self::Indri(_) => &["mu", "lambda"],
        }
    }

    /// Set a model parameter by name.
    ///
    /// Returns `false` (and leaves the model untouched) when the name is unknown for this
    /// model or the value is not acceptable (`mu` must be a non-negative integer).
    pub fn set_parameter(&mut self, name: &str, value: f64) -> bool {
        match self {
            Self::UnrankedBoolean | Self::RankedBoolean => false,
            Self::Bm25(p) => match name {
                "k_1" => {
                    p.k1 = value;
                    true
                }
                "b" => {
                    p.b = value;
                    true
                }
                "k_3" => {
                    p.k3 = value;
                    true
                }
                _ => false,
            },
            Self::Indri(p) => match name {
                "mu" => {
                    if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
                        return false;
                    }
                    p.mu = value as u32;
                    true
                }
                "lambda" => {
                    p.lambda = value;
                    true
                }
                _ => false,
            },
        }
    }

    /// BM25 parameters, if this is the BM25 model.
    pub fn bm25(&self) -> Option<&Bm25Params> {
        match self {
            Self::Bm25(p) => Some(p),
            _ => None,
        }
    }

    /// Indri parameters, if this is the Indri model.
    pub fn indri(&self) -> Option<&IndriParams> {
        match self {
            Self::Indri(p) => Some(p),
            _ => None,
        }
    }

    /// Whether this is one of the two Boolean models.
    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::UnrankedBoolean | Self::RankedBoolean)
    }
}

impl fmt::Display for RetrievalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RetrievalModel {
    type Err = Error;

    /// Parse a model name; parameterized models start from their defaults.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unrankedboolean" => Ok(Self::UnrankedBoolean),
            "rankedboolean" => Ok(Self::RankedBoolean),
            "bm25" => Ok(Self::Bm25(Bm25Params::default())),
            "indri" => Ok(Self::Indri(IndriParams::default())),
            _ => Err(Error::InvalidParameter {
                name: "retrievalAlgorithm".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// BM25 "RSJ" idf without the +1 smoothing: `ln((N - df + 0.5) / (df + 0.5))`.
///
/// Negative for terms in more than half the collection; callers skip `idf <= 0`.
pub fn bm25_idf(n_docs: u64, df: u64) -> f64 {
    let n = n_docs as f64;
    let d = df as f64;
    ((n - d + 0.5) / (d + 0.5)).ln()
}

/// BM25 tf weight: `tf / (tf + k1 * ((1 - b) + b * doc_len / avg_doc_len))`.
pub fn bm25_tf_weight(tf: f64, doc_len: f64, avg_doc_len: f64, k1: f64, b: f64) -> f64 {
    tf / (tf + k1 * ((1.0 - b) + b * doc_len / avg_doc_len))
}

/// Full per-posting BM25 score, or `None` when the term carries no evidence (`idf <= 0`).
pub fn bm25_score(
    params: &Bm25Params,
    n_docs: u64,
    df: u64,
    tf: f64,
    doc_len: f64,
    avg_doc_len: f64,
) -> Option<f64> {
    let idf = bm25_idf(n_docs, df);
    if idf <= 0.0 {
        return None;
    }
    Some(idf * bm25_tf_weight(tf, doc_len, avg_doc_len, params.k1, params.b))
}

/// Background (collection) probability of a term: `ctf / total_term_count`.
///
/// An empty field yields 0 rather than `NaN`.
pub fn collection_probability(ctf: u64, total_term_count: u64) -> f64 {
    if total_term_count == 0 {
        return 0.0;
    }
    ctf as f64 / total_term_count as f64
}

/// Indri smoothed term probability:
/// `(1 - lambda) * (tf + mu * p_c) / (doc_len + mu) + lambda * p_c`.
///
/// With `tf = 0` this is the default score of a document that lacks the term.
/// An empty field with `mu = 0` takes the collection model for the document term.
pub fn indri_score(params: &IndriParams, tf: f64, doc_len: f64, p_collection: f64) -> f64 {
    let mu = params.mu as f64;
    let lambda = params.lambda;
    let denom = doc_len + mu;
    let p_doc = if denom > 0.0 {
        (tf + mu * p_collection) / denom
    } else {
        p_collection
    };
    (1.0 - lambda) * p_doc + lambda * p_collection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn bm25_matches_closed_form() {
        let params = Bm25Params {
            k1: 1.2,
            b: 0.75,
            k3: 0.0,
        };
        let got = bm25_score(&params, 1000, 10, 3.0, 100.0, 50.0).unwrap();

        let idf = ((1000.0 - 10.0 + 0.5) / (10.0 + 0.5_f64)).ln();
        let tf_weight = 3.0 / (3.0 + 1.2 * ((1.0 - 0.75) + 0.75 * 100.0 / 50.0));
        assert!(close(got, idf * tf_weight), "got {got}");
        // tf weight reduces to 3 / 5.1 for these inputs.
        assert!(close(got, idf * 3.0 / 5.1));
    }

    #[test]
    fn bm25_skips_common_terms() {
        let params = Bm25Params::default();
        assert!(bm25_score(&params, 10, 6, 1.0, 10.0, 10.0).is_none());
        assert!(bm25_score(&params, 10, 4, 1.0, 10.0, 10.0).is_some());
    }

    #[test]
    fn indri_matches_closed_form() {
        let params = IndriParams {
            mu: 1000,
            lambda: 0.4,
        };
        let p_c = collection_probability(500, 100_000);
        assert!(close(p_c, 0.005));

        let got = indri_score(&params, 2.0, 80.0, p_c);
        let expected = 0.6 * (2.0 + 1000.0 * 0.005) / (80.0 + 1000.0) + 0.4 * 0.005;
        assert!(close(got, expected), "got {got}");

        let default = indri_score(&params, 0.0, 80.0, p_c);
        let expected_default = 0.6 * (1000.0 * 0.005) / 1080.0 + 0.4 * 0.005;
        assert!(close(default, expected_default));
        assert!(default < got);
    }

    #[test]
    fn indri_without_prior_on_empty_field_falls_back_to_collection() {
        let params = IndriParams { mu: 0, lambda: 0.4 };
        let p_c = collection_probability(1, 4);
        let got = indri_score(&params, 0.0, 0.0, p_c);
        assert!(got.is_finite());
        assert!(close(got, p_c));

        // Non-empty fields keep the maximum-likelihood estimate.
        assert!(close(indri_score(&params, 1.0, 2.0, p_c), 0.6 * 0.5 + 0.4 * p_c));
    }

    #[test]
    fn collection_probability_of_empty_field_is_zero() {
        assert_eq!(collection_probability(0, 0), 0.0);
    }

    #[test]
    fn set_parameter_rejects_unknown_names() {
        let mut m = RetrievalModel::Bm25(Bm25Params::default());
        assert!(m.set_parameter("k_1", 2.0));
        assert!(m.set_parameter("b", 0.5));
        assert!(!m.set_parameter("mu", 100.0));
        assert_eq!(m.bm25().unwrap().k1, 2.0);

        let mut m = RetrievalModel::Indri(IndriParams::default());
        assert!(m.set_parameter("mu", 1500.0));
        assert!(!m.set_parameter("mu", 12.5));
        assert!(!m.set_parameter("k_1", 1.0));
        assert_eq!(m.indri().unwrap().mu, 1500);

        let mut m = RetrievalModel::RankedBoolean;
        assert!(!m.set_parameter("anything", 1.0));
    }

    #[test]
    fn model_names_round_trip() {
        for name in ["UnrankedBoolean", "RankedBoolean", "BM25", "Indri"] {
            let m: RetrievalModel = name.parse().unwrap();
            assert_eq!(m.name(), name);
        }
        assert!("tfidf".parse::<RetrievalModel>().is_err());
    }
}
