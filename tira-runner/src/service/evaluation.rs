//! In-process evaluation with a trusted evaluator

use anyhow::Result;
use std::path::Path;
use tira_core::domain::evaluator::EvaluatorConfig;
use tira_eval::Measures;
use tira_eval::prototext::{to_prototext, write_evaluation};
use tracing::{info, warn};

/// What an in-process evaluation printed and computed
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub command: String,
    pub stdout: String,
    pub stderr: String,

    /// `None` if the evaluation failed
    pub measures: Option<Measures>,
}

/// Evaluates `run_dir` against `truth_dir` and writes `evaluation.prototext`
///
/// A failed evaluation is reported through `stderr`; only a result that
/// cannot be written is an error.
pub fn evaluate_trusted(
    run_dir: &Path,
    truth_dir: &Path,
    config: &EvaluatorConfig,
    output_dir: &Path,
) -> Result<EvaluationReport> {
    let command = format!(
        "evaluate --run {} --truth {}",
        run_dir.display(),
        truth_dir.display()
    );

    match tira_eval::evaluate(run_dir, truth_dir, config) {
        Ok(result) => {
            let path = write_evaluation(output_dir, &result)?;
            let measures = result.flatten();
            info!("Wrote {} measure(s) to {}", measures.len(), path.display());
            Ok(EvaluationReport {
                command,
                stdout: to_prototext(&result),
                stderr: String::new(),
                measures: Some(measures),
            })
        }
        Err(e) => {
            warn!("Evaluation of {} failed: {}", run_dir.display(), e);
            Ok(EvaluationReport {
                command,
                stdout: String::new(),
                stderr: format!("{}\n", e),
                measures: None,
            })
        }
    }
}
