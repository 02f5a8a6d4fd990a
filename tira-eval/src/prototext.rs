//! Evaluation prototext output
//!
//! Results are written as a sequence of `measure { key value }` blocks. Keys
//! are flattened (lagged results become `<lag>_<measure>`), underscores turn
//! into spaces and every word is title-cased.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dispatch::EvaluationResult;
use crate::error::{EvalError, Result};

/// File name of the evaluation output
pub const EVALUATION_FILE: &str = "evaluation.prototext";

/// Renders a result as prototext
pub fn to_prototext(result: &EvaluationResult) -> String {
    let mut output = String::new();
    for (name, value) in result.flatten() {
        output.push_str("measure{\n");
        output.push_str(&format!("  key: \"{}\"\n", title_case(&name.replace('_', " "))));
        output.push_str(&format!("  value: \"{}\"\n", render_value(&value)));
        output.push_str("}\n");
    }
    output
}

/// Writes `evaluation.prototext` into `output_dir`
pub fn write_evaluation(output_dir: &Path, result: &EvaluationResult) -> Result<PathBuf> {
    fs::create_dir_all(output_dir).map_err(|e| EvalError::io(output_dir, e))?;
    let path = output_dir.join(EVALUATION_FILE);
    fs::write(&path, to_prototext(result)).map_err(|e| EvalError::io(&path, e))?;
    Ok(path)
}

/// Upper-cases the first letter of every word, lower-cases the rest
///
/// A word starts after any character that is not a letter.
pub fn title_case(text: &str) -> String {
    let mut previous_is_letter = false;
    text.chars()
        .flat_map(|c| {
            let converted: Vec<char> = if !c.is_alphabetic() {
                vec![c]
            } else if previous_is_letter {
                c.to_lowercase().collect()
            } else {
                c.to_uppercase().collect()
            };
            previous_is_letter = c.is_alphabetic();
            converted
        })
        .collect()
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::Measures;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("nDCG@10"), "Ndcg@10");
        assert_eq!(title_case("RR"), "Rr");
        assert_eq!(title_case("lag-1 nDCG@10"), "Lag-1 Ndcg@10");
        assert_eq!(title_case("Docs Per Query (Avg)"), "Docs Per Query (Avg)");
    }

    #[test]
    fn test_single_result_blocks() {
        let result = EvaluationResult::Single(Measures::from([
            ("NumQueries".to_string(), json!(3)),
            ("RR".to_string(), json!(0.5)),
        ]));

        assert_eq!(
            to_prototext(&result),
            "measure{\n  key: \"Numqueries\"\n  value: \"3\"\n}\n\
             measure{\n  key: \"Rr\"\n  value: \"0.5\"\n}\n"
        );
    }

    #[test]
    fn test_lagged_keys_are_prefixed() {
        let mut lags = BTreeMap::new();
        lags.insert(
            "lag-1".to_string(),
            Measures::from([("nDCG@10".to_string(), json!(0.25))]),
        );
        let text = to_prototext(&EvaluationResult::Lagged(lags));
        assert!(text.contains("key: \"Lag-1 Ndcg@10\""));
        assert!(text.contains("value: \"0.25\""));
    }

    #[test]
    fn test_write_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        let result = EvaluationResult::Single(Measures::from([("RR".to_string(), json!(1.0))]));

        let path = write_evaluation(&output, &result).unwrap();
        assert_eq!(path, output.join(EVALUATION_FILE));
        assert!(fs::read_to_string(path).unwrap().contains("value: \"1.0\""));
    }
}
