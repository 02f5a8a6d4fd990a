//! Evaluator dispatch
//!
//! Partitions the requested measures by evaluator, validates every declared
//! format before any artifact is read, then runs each evaluator once and
//! merges the results into one flat map.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tira_core::domain::evaluator::{EvaluatorConfig, EvaluatorReference};
use tracing::{debug, info};

use crate::config::{DatasetCatalog, EvaluatorConfigCache, ValidatedConfig, validate};
use crate::error::{EvalError, Result};
use crate::evaluators::{Artifact, Evaluator, Measures, instantiate};
use crate::lagged;
use crate::registry::partition;

/// Outcome of an evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EvaluationResult {
    /// Measure name to value
    Single(Measures),
    /// Lag name to the measures of that lag
    Lagged(BTreeMap<String, Measures>),
}

impl EvaluationResult {
    /// Flat measure map, lagged measures prefixed with `<lag>_`
    pub fn flatten(&self) -> Measures {
        match self {
            EvaluationResult::Single(measures) => measures.clone(),
            EvaluationResult::Lagged(lags) => lags
                .iter()
                .flat_map(|(lag, measures)| {
                    measures
                        .iter()
                        .map(move |(name, value)| (format!("{}_{}", lag, name), value.clone()))
                })
                .collect(),
        }
    }
}

/// Evaluates a run directory against a truth directory
///
/// # Arguments
/// * `run_dir` - Directory holding the run artifact
/// * `truth_dir` - Directory holding the ground truth, ignored by evaluators without truth
/// * `config` - Evaluator configuration, single or lagged
pub fn evaluate(run_dir: &Path, truth_dir: &Path, config: &EvaluatorConfig) -> Result<EvaluationResult> {
    if let Some(plan) = lagged::plan(config)? {
        info!("Lagged evaluation over {} lags", plan.lags.len());
        return lagged::evaluate(run_dir, truth_dir, &plan).map(EvaluationResult::Lagged);
    }

    let config = validate(config)?;
    evaluate_validated(run_dir, truth_dir, &config).map(EvaluationResult::Single)
}

/// Resolves an evaluator reference through the cache and evaluates with it
pub fn evaluate_reference(
    cache: &mut EvaluatorConfigCache,
    catalog: &dyn DatasetCatalog,
    reference: &EvaluatorReference,
    run_dir: &Path,
    truth_dir: &Path,
) -> Result<EvaluationResult> {
    let config = cache.resolve(catalog, reference)?;
    evaluate(run_dir, truth_dir, &config)
}

/// Checks a configuration without reading any artifact
///
/// Covers required fields, lag planning, unknown measures and the formats
/// each evaluator accepts, everything [`evaluate`] rejects before I/O.
pub fn check(config: &EvaluatorConfig) -> Result<()> {
    let validated = match lagged::plan(config)? {
        Some(plan) => plan.per_lag,
        None => validate(config)?,
    };
    prepare(&validated).map(|_| ())
}

/// One evaluator per kind, each having accepted the configured formats
fn prepare(config: &ValidatedConfig) -> Result<Vec<(Box<dyn Evaluator>, Vec<String>)>> {
    let evaluators: Vec<(Box<dyn Evaluator>, Vec<String>)> = partition(&config.measures)?
        .into_iter()
        .map(|(kind, measures)| (instantiate(kind), measures))
        .collect();

    for (evaluator, _) in &evaluators {
        evaluator.validate(&config.run_format, &config.truth_format)?;
    }
    Ok(evaluators)
}

/// Evaluates with a configuration whose required fields are present
pub fn evaluate_validated(run_dir: &Path, truth_dir: &Path, config: &ValidatedConfig) -> Result<Measures> {
    let evaluators = prepare(config)?;

    let mut merged = Measures::new();
    for (evaluator, measures) in evaluators {
        let run = Artifact::resolve(run_dir, &config.run_format, evaluator.run_formats(), "run")?;
        let truth = match evaluator.truth_formats() {
            Some(accepted) => Some(Artifact::resolve(
                truth_dir,
                &config.truth_format,
                accepted,
                "truth",
            )?),
            None => None,
        };

        debug!(
            "Running the {} evaluator on {} for {:?}",
            evaluator.kind(),
            run.dir.display(),
            measures
        );
        for (name, value) in evaluator.compute(&run, truth.as_ref(), &measures)? {
            if merged.contains_key(&name) {
                return Err(EvalError::config(format!(
                    "The measure \"{}\" was computed by more than one evaluator.",
                    name
                )));
            }
            merged.insert(name, value);
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetEvaluator;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::fs;

    const RUN: &str = "1 Q0 doc-1 1 10 tag\n1 Q0 doc-2 2 9 tag\n2 Q0 doc-3 1 5 tag\n";
    const QRELS: &str = "1 0 doc-2 1\n2 0 doc-3 1\n";

    fn config(value: Value) -> EvaluatorConfig {
        serde_json::from_value(value).unwrap()
    }

    fn write(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_merges_results_of_several_evaluators() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("run"), "run.txt", RUN);
        write(&dir.path().join("truth"), "qrels.txt", QRELS);

        let result = evaluate(
            &dir.path().join("run"),
            &dir.path().join("truth"),
            &config(json!({
                "measures": ["RR", "NumQueries", "P@10"],
                "run_format": "run.txt",
                "truth_format": "qrels.txt"
            })),
        )
        .unwrap();

        let EvaluationResult::Single(measures) = result else {
            panic!("expected a single result");
        };
        assert_eq!(measures.len(), 3);
        assert_eq!(measures["NumQueries"], json!(2));
        assert!((measures["RR"].as_f64().unwrap() - 0.75).abs() < 1e-9);
        assert!((measures["P@10"].as_f64().unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_format_mismatch_fails_before_reading() {
        let dir = tempfile::tempdir().unwrap();

        let err = evaluate(
            &dir.path().join("missing"),
            &dir.path().join("missing"),
            &config(json!({
                "measures": ["nDCG@10"],
                "run_format": "*.jsonl",
                "truth_format": "qrels.txt"
            })),
        )
        .unwrap_err();

        assert!(err.is_validation());
        assert!(err.to_string().contains("\"*.jsonl\""));
    }

    #[test]
    fn test_missing_truth_field_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = evaluate(
            dir.path(),
            dir.path(),
            &config(json!({"measures": ["NumQueries"], "run_format": "run.txt"})),
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_check_rejects_without_artifacts() {
        assert!(check(&config(json!({
            "measures": ["RR", "NumQueries"],
            "run_format": "run.txt",
            "truth_format": "qrels.txt"
        })))
        .is_ok());

        let unknown = check(&config(json!({
            "measures": ["no-such-measure"],
            "run_format": "run.txt",
            "truth_format": "qrels.txt"
        })))
        .unwrap_err();
        assert!(unknown.to_string().contains("no-such-measure"));

        let mismatch = check(&config(json!({
            "measures": ["nDCG@10"],
            "run_format": "*.jsonl",
            "truth_format": "qrels.txt"
        })))
        .unwrap_err();
        assert!(mismatch.is_validation());

        let missing = check(&config(json!({"measures": ["RR"], "truth_format": "qrels.txt"}))).unwrap_err();
        assert!(missing.to_string().contains("\"run_format\" is missing."));
    }

    #[test]
    fn test_run_file_evaluator_ignores_truth_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("run"), "run.txt", RUN);

        let result = evaluate(
            &dir.path().join("run"),
            &dir.path().join("no-truth"),
            &config(json!({
                "measures": ["Docs Per Query (Max)"],
                "run_format": "run.txt",
                "truth_format": "qrels.txt"
            })),
        )
        .unwrap();

        assert_eq!(
            result,
            EvaluationResult::Single(Measures::from([(
                "Docs Per Query (Max)".to_string(),
                json!(2)
            )]))
        );
    }

    #[test]
    fn test_lagged_result_is_keyed_by_lag() {
        let dir = tempfile::tempdir().unwrap();
        for lag in ["lag-1", "lag-3"] {
            write(&dir.path().join("run").join(lag), "run.txt", RUN);
            write(&dir.path().join("truth").join(lag), "qrels.txt", QRELS);
        }

        let result = evaluate(
            &dir.path().join("run"),
            &dir.path().join("truth"),
            &config(json!({
                "measures": ["RR"],
                "run_format": "LongEvalLags",
                "run_format_configuration": {"lags": ["lag-1", "lag-3"], "format": "run.txt"},
                "truth_format": "LongEvalLags",
                "truth_format_configuration": {"lags": ["lag-1", "lag-3"], "format": "qrels.txt"}
            })),
        )
        .unwrap();

        let EvaluationResult::Lagged(lags) = &result else {
            panic!("expected a lagged result");
        };
        assert_eq!(lags.keys().collect::<Vec<_>>(), vec!["lag-1", "lag-3"]);
        assert!(lags["lag-3"].contains_key("RR"));
        assert!(result.flatten().contains_key("lag-1_RR"));
    }

    #[test]
    fn test_lagged_run_without_lag_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("run").join("lag-1"), "run.txt", RUN);

        let err = evaluate(
            &dir.path().join("run"),
            &dir.path().join("truth"),
            &config(json!({
                "measures": ["RR"],
                "run_format": "LongEvalLags",
                "run_format_configuration": {"lags": ["lag-1", "lag-2"], "format": "run.txt"},
                "truth_format": "LongEvalLags",
                "truth_format_configuration": {"lags": ["lag-1", "lag-2"], "format": "qrels.txt"}
            })),
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_evaluate_reference_uses_dataset_evaluator() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "run.txt", RUN);

        let mut catalog = HashMap::new();
        catalog.insert(
            "dataset-1".to_string(),
            DatasetEvaluator {
                config: config(json!({
                    "measures": ["NumQueries"],
                    "run_format": "run.txt",
                    "truth_format": "qrels.txt"
                })),
                trusted: true,
            },
        );

        let mut cache = EvaluatorConfigCache::new();
        let result = evaluate_reference(
            &mut cache,
            &catalog,
            &EvaluatorReference::Dataset("dataset-1".to_string()),
            dir.path(),
            dir.path(),
        )
        .unwrap();
        assert_eq!(result.flatten()["NumQueries"], json!(2));
        assert_eq!(cache.len(), 1);
    }
}
