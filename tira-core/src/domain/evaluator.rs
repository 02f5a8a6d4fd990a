//! Evaluator configuration
//!
//! Declares which measures to compute and which artifact formats the run and
//! the ground truth are expected in. Validation lives with the evaluation
//! engine, so every field here is optional on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A format identifier or an ordered list of alternatives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormatSpec {
    Single(String),
    Alternatives(Vec<String>),
}

impl FormatSpec {
    /// All format identifiers in preference order
    pub fn candidates(&self) -> Vec<&str> {
        match self {
            FormatSpec::Single(format) => vec![format.as_str()],
            FormatSpec::Alternatives(formats) => formats.iter().map(String::as_str).collect(),
        }
    }

    /// The preferred format identifier
    pub fn primary(&self) -> Option<&str> {
        self.candidates().into_iter().next()
    }
}

impl From<&str> for FormatSpec {
    fn from(value: &str) -> Self {
        FormatSpec::Single(value.to_string())
    }
}

impl std::fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatSpec::Single(format) => f.write_str(format),
            FormatSpec::Alternatives(formats) => write!(f, "[{}]", formats.join(", ")),
        }
    }
}

/// Evaluator configuration as declared by a dataset or a caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measures: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_format: Option<FormatSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth_format: Option<FormatSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_format_configuration: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truth_format_configuration: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_args: Option<Map<String, Value>>,
}

/// How a caller names the evaluator to use
///
/// Either an inline configuration or a dataset whose trusted evaluator is looked up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvaluatorReference {
    Dataset(String),
    Inline(EvaluatorConfig),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_spec_accepts_string_or_list() {
        let single: FormatSpec = serde_json::from_str("\"run.txt\"").unwrap();
        assert_eq!(single.candidates(), vec!["run.txt"]);

        let list: FormatSpec = serde_json::from_str(r#"["*.jsonl", "run.txt"]"#).unwrap();
        assert_eq!(list.primary(), Some("*.jsonl"));
    }

    #[test]
    fn test_reference_shapes() {
        let by_dataset: EvaluatorReference = serde_json::from_str("\"dataset-1\"").unwrap();
        assert_eq!(by_dataset, EvaluatorReference::Dataset("dataset-1".to_string()));

        let inline: EvaluatorReference = serde_json::from_str(
            r#"{"measures": ["P@10"], "run_format": "run.txt", "truth_format": "qrels.txt"}"#,
        )
        .unwrap();
        match inline {
            EvaluatorReference::Inline(config) => {
                assert_eq!(config.measures, Some(vec!["P@10".to_string()]));
                assert_eq!(config.truth_format, Some(FormatSpec::from("qrels.txt")));
            }
            other => panic!("expected inline config, got {:?}", other),
        }
    }
}
