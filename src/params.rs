//! Batch parameter files.
//!
//! One `key=value` per line; keys and values are trimmed, blank lines and lines starting with
//! `#` are ignored. Model parameters are namespaced by model (`BM25:k_1`, `Indri:mu`, ...);
//! every parameter of the selected model is required.
//!
//! Relative paths are resolved against the directory of the parameter file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::feedback::FeedbackConfig;
use crate::model::RetrievalModel;
use crate::ranking::{DEFAULT_OUTPUT_LENGTH, DEFAULT_RUN_TAG};
use crate::Error;

/// Raw `key -> value` pairs.
pub type ParamMap = BTreeMap<String, String>;

/// Parse `key=value` lines.
pub fn parse_param_lines(text: &str) -> Result<ParamMap, Error> {
    let mut map = ParamMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(Error::InvalidParameter {
                name: line.to_string(),
                value: String::new(),
            });
        };
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(map)
}

/// Pseudo-relevance feedback settings of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackParams {
    /// Term selection settings.
    pub config: FeedbackConfig,
    /// Where expansion queries are written.
    pub expansion_file: PathBuf,
    /// Initial rankings to expand from, instead of evaluating the queries.
    pub initial_ranking_file: Option<PathBuf>,
}

/// A validated batch configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    /// Persisted index.
    pub index_path: PathBuf,
    /// Query file (`qid:query` lines).
    pub query_file: PathBuf,
    /// Run file to write.
    pub output_path: PathBuf,
    /// Retrieval model with its parameters applied.
    pub model: RetrievalModel,
    /// Documents written per query.
    pub output_length: usize,
    /// Run tag column.
    pub run_tag: String,
    /// Feedback settings, when `fb=true`.
    pub feedback: Option<FeedbackParams>,
}

impl Params {
    /// Read and validate a parameter file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_map(&parse_param_lines(&text)?, base)
    }

    /// Validate raw parameters; relative paths are joined onto `base`.
    pub fn from_map(map: &ParamMap, base: &Path) -> Result<Self, Error> {
        let path = |key: &str| required(map, key).map(|v| base.join(v));

        let mut model = RetrievalModel::from_str(required(map, "retrievalAlgorithm")?)?;
        for name in model.parameter_names() {
            let key = format!("{}:{}", model.name(), name);
            let raw = required(map, &key)?;
            let value: f64 = number(&key, raw)?;
            if !model.set_parameter(name, value) {
                return Err(Error::InvalidParameter {
                    name: key,
                    value: raw.to_string(),
                });
            }
        }

        let output_length = match map.get("trecEvalOutputLength") {
            Some(v) => number("trecEvalOutputLength", v)?,
            None => DEFAULT_OUTPUT_LENGTH,
        };
        let run_tag = map
            .get("runTag")
            .cloned()
            .unwrap_or_else(|| DEFAULT_RUN_TAG.to_string());

        let fb = match map.get("fb").map(String::as_str) {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => {
                return Err(Error::InvalidParameter {
                    name: "fb".to_string(),
                    value: other.to_string(),
                })
            }
        };
        let feedback = if fb {
            if !matches!(model, RetrievalModel::Indri(_)) {
                return Err(Error::InvalidParameter {
                    name: "fb".to_string(),
                    value: format!("true (feedback needs Indri, not {model})"),
                });
            }
            let config = FeedbackConfig {
                docs: number("fbDocs", required(map, "fbDocs")?)?,
                terms: number("fbTerms", required(map, "fbTerms")?)?,
                mu: number("fbMu", required(map, "fbMu")?)?,
                orig_weight: number("fbOrigWeight", required(map, "fbOrigWeight")?)?,
            };
            config.validate()?;
            Some(FeedbackParams {
                config,
                expansion_file: path("fbExpansionQueryFile")?,
                initial_ranking_file: map.get("fbInitialRankingFile").map(|v| base.join(v)),
            })
        } else {
            None
        };

        Ok(Self {
            index_path: path("indexPath")?,
            query_file: path("queryFilePath")?,
            output_path: path("trecEvalOutputPath")?,
            model,
            output_length,
            run_tag,
            feedback,
        })
    }
}

fn required<'m>(map: &'m ParamMap, key: &str) -> Result<&'m str, Error> {
    map.get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::MissingParameter(key.to_string()))
}

fn number<T: FromStr>(key: &str, raw: &str) -> Result<T, Error> {
    raw.parse().map_err(|_| Error::InvalidParameter {
        name: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IndriParams;

    const BASE: &str = "
# comment
indexPath = idx.bin
queryFilePath=queries.txt
trecEvalOutputPath=/tmp/run.txt
";

    fn load(extra: &str) -> Result<Params, Error> {
        let map = parse_param_lines(&format!("{BASE}{extra}"))?;
        Params::from_map(&map, Path::new("/work"))
    }

    #[test]
    fn boolean_run_with_defaults() {
        let p = load("retrievalAlgorithm=RankedBoolean\n").unwrap();
        assert_eq!(p.model, RetrievalModel::RankedBoolean);
        assert_eq!(p.index_path, PathBuf::from("/work/idx.bin"));
        assert_eq!(p.output_path, PathBuf::from("/tmp/run.txt"));
        assert_eq!(p.output_length, 100);
        assert_eq!(p.run_tag, "structir");
        assert!(p.feedback.is_none());
    }

    #[test]
    fn model_parameters_are_required() {
        let err = load("retrievalAlgorithm=BM25\nBM25:k_1=1.2\nBM25:b=0.75\n").unwrap_err();
        assert!(matches!(err, Error::MissingParameter(ref k) if k == "BM25:k_3"), "{err}");

        let p = load("retrievalAlgorithm=Indri\nIndri:mu=1000\nIndri:lambda=0.7\n").unwrap();
        assert_eq!(
            p.model,
            RetrievalModel::Indri(IndriParams {
                mu: 1000,
                lambda: 0.7
            })
        );
    }

    #[test]
    fn bad_values_name_the_key() {
        let err = load("retrievalAlgorithm=Indri\nIndri:mu=2.5\nIndri:lambda=0.4\n").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "Indri:mu"));
        let err = load("retrievalAlgorithm=Cosine\n").unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "retrievalAlgorithm"));
        assert!(parse_param_lines("no equals sign").is_err());
    }

    #[test]
    fn feedback_settings() {
        let indri = "retrievalAlgorithm=Indri\nIndri:mu=2500\nIndri:lambda=0.4\n";
        let fb = "fb=true\nfbDocs=10\nfbTerms=5\nfbMu=0\nfbOrigWeight=0.5\nfbExpansionQueryFile=exp.txt\n";
        let p = load(&format!("{indri}{fb}")).unwrap();
        let f = p.feedback.unwrap();
        assert_eq!(f.config.docs, 10);
        assert_eq!(f.config.terms, 5);
        assert_eq!(f.expansion_file, PathBuf::from("/work/exp.txt"));
        assert!(f.initial_ranking_file.is_none());

        let err = load(&format!("{indri}fb=true\nfbDocs=10\n")).unwrap_err();
        assert!(matches!(err, Error::MissingParameter(_)));

        let err = load(&format!("retrievalAlgorithm=RankedBoolean\n{fb}")).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "fb"));
    }
}
