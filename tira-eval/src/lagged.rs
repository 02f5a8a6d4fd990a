//! Lagged evaluation
//!
//! A LongEval-style configuration evaluates the same measures independently on
//! every named lag (a sub-corpus or time slice, stored in `<dir>/<lag>/`).
//! It is recognised by its shape:
//!
//! ```json
//! {
//!   "measures": ["nDCG@10"],
//!   "run_format": "LongEvalLags",
//!   "run_format_configuration": {"lags": ["lag-1", "lag-3"], "format": "run.txt"},
//!   "truth_format": "LongEvalLags",
//!   "truth_format_configuration": {"lags": ["lag-1", "lag-3"], "format": "qrels.txt"}
//! }
//! ```

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tira_core::domain::evaluator::{EvaluatorConfig, FormatSpec};
use tracing::info;

use crate::config::{ValidatedConfig, validate};
use crate::dispatch::evaluate_validated;
use crate::error::{EvalError, Result};
use crate::evaluators::Measures;

/// Run format marking a lagged configuration
pub const LAGGED_FORMAT: &str = "LongEvalLags";

/// Lags to evaluate and the configuration applied to each of them
#[derive(Debug, Clone, PartialEq)]
pub struct LagPlan {
    pub lags: Vec<String>,
    pub per_lag: ValidatedConfig,
}

/// Whether a configuration asks for lagged evaluation
pub fn is_lagged(config: &EvaluatorConfig) -> bool {
    config.run_format.as_ref().and_then(FormatSpec::primary) == Some(LAGGED_FORMAT)
}

/// Builds the per-lag plan of a lagged configuration, `None` for a single one
pub fn plan(config: &EvaluatorConfig) -> Result<Option<LagPlan>> {
    if !is_lagged(config) {
        return Ok(None);
    }

    let run = section(config.run_format_configuration.as_ref(), "run_format_configuration")?;
    let truth = section(
        config.truth_format_configuration.as_ref(),
        "truth_format_configuration",
    )?;

    let lags = string_list(run, "run_format_configuration", "lags")?;
    let truth_lags = string_list(truth, "truth_format_configuration", "lags")?;
    if lags.is_empty() {
        return Err(invalid("\"run_format_configuration.lags\" lists no lag."));
    }
    reject_duplicates(&lags, "run_format_configuration")?;
    reject_duplicates(&truth_lags, "truth_format_configuration")?;
    let lag_set: BTreeSet<&String> = lags.iter().collect();
    let truth_lag_set: BTreeSet<&String> = truth_lags.iter().collect();
    if lag_set != truth_lag_set {
        return Err(invalid(
            "the lags of the run and of the truth configuration differ.",
        ));
    }

    let per_lag = validate(&EvaluatorConfig {
        measures: config.measures.clone(),
        run_format: Some(FormatSpec::Single(string_field(
            run,
            "run_format_configuration",
            "format",
        )?)),
        truth_format: Some(FormatSpec::Single(string_field(
            truth,
            "truth_format_configuration",
            "format",
        )?)),
        additional_args: config.additional_args.clone(),
        ..Default::default()
    })?;

    Ok(Some(LagPlan { lags, per_lag }))
}

/// Evaluates every lag of a plan
pub fn evaluate(
    run_dir: &Path,
    truth_dir: &Path,
    plan: &LagPlan,
) -> Result<BTreeMap<String, Measures>> {
    let mut results = BTreeMap::new();

    for lag in &plan.lags {
        let run_lag_dir = run_dir.join(lag);
        if !run_lag_dir.is_dir() {
            return Err(EvalError::validation(format!(
                "The run contains no directory for lag \"{}\".",
                lag
            )));
        }

        info!("Evaluating lag {}", lag);
        let measures = evaluate_validated(&run_lag_dir, &truth_dir.join(lag), &plan.per_lag)?;
        results.insert(lag.clone(), measures);
    }

    Ok(results)
}

/// Lag names key the result, a repeated one would overwrite its twin
fn reject_duplicates(lags: &[String], name: &str) -> Result<()> {
    let mut seen = BTreeSet::new();
    for lag in lags {
        if !seen.insert(lag) {
            return Err(invalid(&format!(
                "\"{}.lags\" lists the lag \"{}\" more than once.",
                name, lag
            )));
        }
    }
    Ok(())
}

fn section<'a>(
    section: Option<&'a Map<String, Value>>,
    name: &str,
) -> Result<&'a Map<String, Value>> {
    section.ok_or_else(|| invalid(&format!("\"{}\" is missing for lagged evaluation.", name)))
}

fn string_list(section: &Map<String, Value>, name: &str, field: &str) -> Result<Vec<String>> {
    let values = section
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(&format!("\"{}.{}\" must be a list.", name, field)))?;

    values
        .iter()
        .map(|value| {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(&format!("\"{}.{}\" must list strings.", name, field)))
        })
        .collect()
}

fn string_field(section: &Map<String, Value>, name: &str, field: &str) -> Result<String> {
    section
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid(&format!("\"{}.{}\" is missing.", name, field)))
}

fn invalid(reason: &str) -> EvalError {
    EvalError::config(format!(
        "Configuration of the evaluator is invalid: {}",
        reason
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lagged_config(run_lags: Value, truth_lags: Value) -> EvaluatorConfig {
        serde_json::from_value(json!({
            "measures": ["nDCG@10", "RR"],
            "run_format": "LongEvalLags",
            "run_format_configuration": {"lags": run_lags, "format": "run.txt"},
            "truth_format": "LongEvalLags",
            "truth_format_configuration": {"lags": truth_lags, "format": "qrels.txt"}
        }))
        .unwrap()
    }

    #[test]
    fn test_single_config_has_no_plan() {
        let config: EvaluatorConfig = serde_json::from_value(json!({
            "measures": ["RR"], "run_format": "run.txt", "truth_format": "qrels.txt"
        }))
        .unwrap();
        assert!(plan(&config).unwrap().is_none());
    }

    #[test]
    fn test_plan_uses_inner_formats() {
        let plan = plan(&lagged_config(json!(["lag-1", "lag-3"]), json!(["lag-3", "lag-1"])))
            .unwrap()
            .unwrap();
        assert_eq!(plan.lags, vec!["lag-1", "lag-3"]);
        assert_eq!(plan.per_lag.run_format, FormatSpec::from("run.txt"));
        assert_eq!(plan.per_lag.truth_format, FormatSpec::from("qrels.txt"));
    }

    #[test]
    fn test_plan_rejects_differing_lags() {
        let err = plan(&lagged_config(json!(["lag-1"]), json!(["lag-2"]))).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_plan_rejects_repeated_lag() {
        let err = plan(&lagged_config(
            json!(["lag-1", "lag-3", "lag-1"]),
            json!(["lag-1", "lag-3"]),
        ))
        .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("lists the lag \"lag-1\" more than once"));

        let err = plan(&lagged_config(json!(["lag-1"]), json!(["lag-1", "lag-1"]))).unwrap_err();
        assert!(err.to_string().contains("truth_format_configuration.lags"));
    }

    #[test]
    fn test_plan_requires_lag_list() {
        let err = plan(&lagged_config(json!("lag-1"), json!(["lag-1"]))).unwrap_err();
        assert!(err.to_string().contains("run_format_configuration.lags"));
    }
}
