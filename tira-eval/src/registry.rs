//! Static measure registry
//!
//! Maps every known measure name to the evaluator kind computing it.

use crate::error::{EvalError, Result};

/// Evaluator implementations known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluatorKind {
    /// Ranking measures over a TREC run and qrels
    Ranking,
    /// Per-query statistics of a TREC run
    RunFile,
    /// Classification measures over predicted labels
    Label,
    /// Statistics over generated texts
    Text,
}

impl std::fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluatorKind::Ranking => write!(f, "ranking"),
            EvaluatorKind::RunFile => write!(f, "run-file"),
            EvaluatorKind::Label => write!(f, "label"),
            EvaluatorKind::Text => write!(f, "text"),
        }
    }
}

pub const NDCG_10: &str = "nDCG@10";
pub const P_10: &str = "P@10";
pub const RR: &str = "RR";
pub const DOCS_PER_QUERY_AVG: &str = "Docs Per Query (Avg)";
pub const DOCS_PER_QUERY_MIN: &str = "Docs Per Query (Min)";
pub const DOCS_PER_QUERY_MAX: &str = "Docs Per Query (Max)";
pub const NUM_QUERIES: &str = "NumQueries";
pub const ACCURACY: &str = "accuracy";
pub const PRECISION: &str = "precision";
pub const RECALL: &str = "recall";
pub const F1: &str = "f1";
pub const WORDS_MIN: &str = "Words (Min)";
pub const WORDS_AVG: &str = "Words (Avg)";
pub const WORDS_MAX: &str = "Words (Max)";

const MEASURE_TO_EVALUATOR: &[(&str, EvaluatorKind)] = &[
    (NDCG_10, EvaluatorKind::Ranking),
    (P_10, EvaluatorKind::Ranking),
    (RR, EvaluatorKind::Ranking),
    (DOCS_PER_QUERY_AVG, EvaluatorKind::RunFile),
    (DOCS_PER_QUERY_MIN, EvaluatorKind::RunFile),
    (DOCS_PER_QUERY_MAX, EvaluatorKind::RunFile),
    (NUM_QUERIES, EvaluatorKind::RunFile),
    (ACCURACY, EvaluatorKind::Label),
    (PRECISION, EvaluatorKind::Label),
    (RECALL, EvaluatorKind::Label),
    (F1, EvaluatorKind::Label),
    (WORDS_MIN, EvaluatorKind::Text),
    (WORDS_AVG, EvaluatorKind::Text),
    (WORDS_MAX, EvaluatorKind::Text),
];

/// Evaluator kind computing `measure`
pub fn evaluator_for(measure: &str) -> Option<EvaluatorKind> {
    MEASURE_TO_EVALUATOR
        .iter()
        .find(|(name, _)| *name == measure)
        .map(|(_, kind)| *kind)
}

/// All registered measure names
pub fn known_measures() -> impl Iterator<Item = &'static str> {
    MEASURE_TO_EVALUATOR.iter().map(|(name, _)| *name)
}

/// Groups the requested measures by evaluator kind
///
/// Kinds appear in the order of their first requested measure. Unknown
/// measure names fail before any artifact is read.
pub fn partition(measures: &[String]) -> Result<Vec<(EvaluatorKind, Vec<String>)>> {
    let mut groups: Vec<(EvaluatorKind, Vec<String>)> = Vec::new();

    for measure in measures {
        let kind = evaluator_for(measure).ok_or_else(|| {
            EvalError::config(format!(
                "Unknown measure \"{}\". Known measures are: {}.",
                measure,
                known_measures().collect::<Vec<_>>().join(", ")
            ))
        })?;

        match groups.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, group)) => {
                if !group.contains(measure) {
                    group.push(measure.clone());
                }
            }
            None => groups.push((kind, vec![measure.clone()])),
        }
    }

    Ok(groups)
}
