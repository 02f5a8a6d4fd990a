//! Run-file evaluator
//!
//! Per-query statistics of a TREC run; the ground truth is not read.

use serde_json::json;

use super::ranking::parse_run;
use super::{Artifact, Evaluator, Measures, select};
use crate::error::{EvalError, Result};
use crate::registry::{
    DOCS_PER_QUERY_AVG, DOCS_PER_QUERY_MAX, DOCS_PER_QUERY_MIN, EvaluatorKind, NUM_QUERIES,
};

pub struct RunFileEvaluator;

impl Evaluator for RunFileEvaluator {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::RunFile
    }

    fn run_formats(&self) -> &'static [&'static str] {
        &["run.txt"]
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
        let ranking = parse_run(run)?;
        let counts: Vec<usize> = ranking.values().map(Vec::len).collect();

        let (Some(min), Some(max)) = (counts.iter().min(), counts.iter().max()) else {
            return Err(EvalError::validation("The run contains no queries."));
        };
        let total: usize = counts.iter().sum();

        let mut all = Measures::new();
        all.insert(
            DOCS_PER_QUERY_AVG.to_string(),
            json!(total as f64 / counts.len() as f64),
        );
        all.insert(DOCS_PER_QUERY_MIN.to_string(), json!(min));
        all.insert(DOCS_PER_QUERY_MAX.to_string(), json!(max));
        all.insert(NUM_QUERIES.to_string(), json!(counts.len()));

        Ok(select(all, measures))
    }
}
