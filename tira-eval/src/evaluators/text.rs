//! Text evaluator
//!
//! Word statistics over generated texts in JSON lines with `id` and `text`
//! fields; the ground truth is not read.

use serde_json::json;

use super::labels::read_field;
use super::{Artifact, Evaluator, Measures, select};
use crate::error::{EvalError, Result};
use crate::registry::{EvaluatorKind, WORDS_AVG, WORDS_MAX, WORDS_MIN};

pub struct TextEvaluator;

impl Evaluator for TextEvaluator {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Text
    }

    fn run_formats(&self) -> &'static [&'static str] {
        &["*.jsonl"]
    }

    fn truth_formats(&self) -> Option<&'static [&'static str]> {
        None
    }

    fn compute(
        &self,
        run: &Artifact,
        _truth: Option<&Artifact>,
        measures: &[String],
    ) -> Result<Measures> {
        let texts = read_field(run, "text")?;
        let words: Vec<usize> = texts
            .values()
            .map(|text| text.split_whitespace().count())
            .collect();

        let (Some(min), Some(max)) = (words.iter().min(), words.iter().max()) else {
            return Err(EvalError::validation("The run contains no texts."));
        };
        let total: usize = words.iter().sum();

        let mut all = Measures::new();
        all.insert(WORDS_MIN.to_string(), json!(min));
        all.insert(
            WORDS_AVG.to_string(),
            json!(total as f64 / words.len() as f64),
        );
        all.insert(WORDS_MAX.to_string(), json!(max));

        Ok(select(all, measures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_statistics() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("generated.jsonl"),
            "{\"id\": \"1\", \"text\": \"a b c\"}\n{\"id\": \"2\", \"text\": \"a\"}\n",
        )
        .unwrap();
        let run = Artifact {
            dir: dir.path().to_path_buf(),
            format: "*.jsonl".to_string(),
        };

        let requested = vec![
            WORDS_MIN.to_string(),
            WORDS_AVG.to_string(),
            WORDS_MAX.to_string(),
        ];
        let measures = TextEvaluator.compute(&run, None, &requested).unwrap();

        assert_eq!(measures[WORDS_MIN], json!(1));
        assert_eq!(measures[WORDS_AVG], json!(2.0));
        assert_eq!(measures[WORDS_MAX], json!(3));
    }
}
