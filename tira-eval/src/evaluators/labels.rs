//! Label evaluator
//!
//! Classification measures over JSON lines with `id` and `label` fields.
//! Precision, recall and F1 are macro-averaged over every label that occurs
//! in the ground truth or in the predictions for ground-truth ids.

use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};

use super::{Artifact, Evaluator, Measures, SourceLine, select};
use crate::error::{EvalError, Result};
use crate::registry::{ACCURACY, EvaluatorKind, F1, PRECISION, RECALL};

pub struct LabelEvaluator;

impl Evaluator for LabelEvaluator {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Label
    }

    fn run_formats(&self) -> &'static [&'static str] {
        &["*.jsonl"]
    }

    fn truth_formats(&self) -> Option<&'static [&'static str]> {
        Some(&["*.jsonl"])
    }

    fn compute(
        &self,
        run: &Artifact,
        truth: Option<&Artifact>,
        measures: &[String],
    ) -> Result<Measures> {
        let truth = truth
            .ok_or_else(|| EvalError::validation("The label evaluator needs a ground truth."))?;

        let predictions = read_field(run, "label")?;
        let expected = read_field(truth, "label")?;
        if expected.is_empty() {
            return Err(EvalError::validation(
                "The ground truth contains no labels.",
            ));
        }

        let mut pairs = Vec::with_capacity(expected.len());
        for (id, label) in &expected {
            let predicted = predictions.get(id).ok_or_else(|| {
                EvalError::validation(format!("The run contains no prediction for id \"{}\".", id))
            })?;
            pairs.push((label.as_str(), predicted.as_str()));
        }

        Ok(select(scores(&pairs), measures))
    }
}

/// Reads `id -> field` from JSON lines, rejecting duplicate ids
pub(crate) fn read_field(artifact: &Artifact, field: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();

    for line in artifact.lines()? {
        let (id, value) = parse_entry(&line, field)?;
        if values.insert(id.clone(), value).is_some() {
            return Err(line.error(format!("id \"{}\" occurs more than once", id)));
        }
    }

    Ok(values)
}

fn parse_entry(line: &SourceLine, field: &str) -> Result<(String, String)> {
    let entry: Value = serde_json::from_str(&line.text)
        .map_err(|e| line.error(format!("not a JSON line: {}", e)))?;

    let id = entry
        .get("id")
        .map(scalar_to_string)
        .ok_or_else(|| line.error("the field \"id\" is missing"))?;
    let value = entry
        .get(field)
        .map(scalar_to_string)
        .ok_or_else(|| line.error(format!("the field \"{}\" is missing", field)))?;

    Ok((id, value))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Accuracy and macro-averaged precision, recall and F1 of `(expected, predicted)` pairs
fn scores(pairs: &[(&str, &str)]) -> Measures {
    let labels: BTreeSet<&str> = pairs
        .iter()
        .flat_map(|(expected, predicted)| [*expected, *predicted])
        .collect();

    let correct = pairs.iter().filter(|(e, p)| e == p).count();

    let mut precision_sum = 0.0;
    let mut recall_sum = 0.0;
    let mut f1_sum = 0.0;
    for label in &labels {
        let tp = pairs.iter().filter(|(e, p)| e == label && p == label).count() as f64;
        let fp = pairs.iter().filter(|(e, p)| e != label && p == label).count() as f64;
        let fn_ = pairs.iter().filter(|(e, p)| e == label && p != label).count() as f64;

        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        precision_sum += precision;
        recall_sum += recall;
        f1_sum += f1;
    }

    let label_count = labels.len() as f64;
    let mut measures = Measures::new();
    measures.insert(
        ACCURACY.to_string(),
        json!(correct as f64 / pairs.len() as f64),
    );
    measures.insert(PRECISION.to_string(), json!(precision_sum / label_count));
    measures.insert(RECALL.to_string(), json!(recall_sum / label_count));
    measures.insert(F1.to_string(), json!(f1_sum / label_count));
    measures
}
