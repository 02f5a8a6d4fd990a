//! Ranking evaluator
//!
//! Computes trec_eval style measures of a TREC run (`qid Q0 docno rank score tag`)
//! against qrels (`qid iteration docno relevance`). Documents are ordered by
//! score descending with ties broken by docno descending; the rank column is
//! ignored. Measures are averaged over the queries of the ground truth.

use serde_json::json;
use std::collections::{BTreeMap, HashMap};

use super::{Artifact, Evaluator, Measures, SourceLine};
use crate::error::{EvalError, Result};
use crate::registry::{EvaluatorKind, NDCG_10, P_10, RR};

const CUTOFF: usize = 10;

pub struct RankingEvaluator;

impl Evaluator for RankingEvaluator {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Ranking
    }

    fn run_formats(&self) -> &'static [&'static str] {
        &["run.txt"]
    }

    fn truth_formats(&self) -> Option<&'static [&'static str]> {
        Some(&["qrels.txt"])
    }

    fn compute(
        &self,
        run: &Artifact,
        truth: Option<&Artifact>,
        measures: &[String],
    ) -> Result<Measures> {
        let truth = truth.ok_or_else(|| {
            EvalError::validation("The ranking evaluator needs a ground truth.")
        })?;

        let ranking = parse_run(run)?;
        let qrels = parse_qrels(truth)?;

        if qrels.is_empty() {
            return Err(EvalError::validation(
                "The ground truth contains no judged queries.",
            ));
        }

        let mut totals: HashMap<&str, f64> = HashMap::new();
        for (qid, judgments) in &qrels {
            let docs = ranking.get(qid).ok_or_else(|| {
                EvalError::validation(format!(
                    "The run contains no results for query \"{}\" of the ground truth.",
                    qid
                ))
            })?;
            let ranked = ranked_docnos(docs);

            for measure in measures {
                let value = match measure.as_str() {
                    NDCG_10 => ndcg_at(&ranked, judgments, CUTOFF),
                    P_10 => precision_at(&ranked, judgments, CUTOFF),
                    RR => reciprocal_rank(&ranked, judgments),
                    other => {
                        return Err(EvalError::config(format!(
                            "The ranking evaluator cannot compute \"{}\".",
                            other
                        )));
                    }
                };
                *totals.entry(measure.as_str()).or_default() += value;
            }
        }

        let query_count = qrels.len() as f64;
        Ok(totals
            .into_iter()
            .map(|(measure, total)| (measure.to_string(), json!(total / query_count)))
            .collect())
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// One retrieved document of a TREC run
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RetrievedDoc {
    pub docno: String,
    pub score: f64,
}

/// Parses a TREC run into the retrieved documents per query
pub(crate) fn parse_run(run: &Artifact) -> Result<BTreeMap<String, Vec<RetrievedDoc>>> {
    let mut ranking: BTreeMap<String, Vec<RetrievedDoc>> = BTreeMap::new();

    for line in run.lines()? {
        let columns: Vec<&str> = line.text.split_whitespace().collect();
        if columns.len() != 6 {
            return Err(line.error(format!(
                "expected 6 columns \"qid Q0 docno rank score tag\" of a run, found {}",
                columns.len()
            )));
        }

        let score = parse_number::<f64>(&line, columns[4], "score")?;
        parse_number::<i64>(&line, columns[3], "rank")?;

        ranking
            .entry(columns[0].to_string())
            .or_default()
            .push(RetrievedDoc {
                docno: columns[2].to_string(),
                score,
            });
    }

    Ok(ranking)
}

/// Parses qrels into the judged documents per query
fn parse_qrels(truth: &Artifact) -> Result<BTreeMap<String, HashMap<String, i64>>> {
    let mut qrels: BTreeMap<String, HashMap<String, i64>> = BTreeMap::new();

    for line in truth.lines()? {
        let columns: Vec<&str> = line.text.split_whitespace().collect();
        if columns.len() != 4 {
            return Err(line.error(format!(
                "expected 4 columns \"qid iteration docno relevance\" of qrels, found {}",
                columns.len()
            )));
        }

        let relevance = parse_number::<i64>(&line, columns[3], "relevance")?;
        qrels
            .entry(columns[0].to_string())
            .or_default()
            .insert(columns[2].to_string(), relevance);
    }

    Ok(qrels)
}

fn parse_number<T: std::str::FromStr>(line: &SourceLine, value: &str, column: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| line.error(format!("{} {:?} is not a number", column, value)))
}

fn ranked_docnos(docs: &[RetrievedDoc]) -> Vec<&str> {
    let mut sorted: Vec<&RetrievedDoc> = docs.iter().collect();
    sorted.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.docno.cmp(&a.docno))
    });
    sorted.into_iter().map(|doc| doc.docno.as_str()).collect()
}

// =============================================================================
// Measures
// =============================================================================

fn gain(judgments: &HashMap<String, i64>, docno: &str) -> f64 {
    judgments.get(docno).copied().unwrap_or(0).max(0) as f64
}

fn discount(position: usize) -> f64 {
    ((position + 2) as f64).log2()
}

fn ndcg_at(ranked: &[&str], judgments: &HashMap<String, i64>, k: usize) -> f64 {
    let dcg: f64 = ranked
        .iter()
        .take(k)
        .enumerate()
        .map(|(position, docno)| gain(judgments, docno) / discount(position))
        .sum();

    let mut ideal: Vec<f64> = judgments
        .values()
        .filter(|relevance| **relevance > 0)
        .map(|relevance| *relevance as f64)
        .collect();
    ideal.sort_by(|a, b| b.total_cmp(a));
    let idcg: f64 = ideal
        .iter()
        .take(k)
        .enumerate()
        .map(|(position, relevance)| relevance / discount(position))
        .sum();

    if idcg == 0.0 { 0.0 } else { dcg / idcg }
}

fn precision_at(ranked: &[&str], judgments: &HashMap<String, i64>, k: usize) -> f64 {
    let relevant = ranked
        .iter()
        .take(k)
        .filter(|docno| gain(judgments, docno) > 0.0)
        .count();
    relevant as f64 / k as f64
}

fn reciprocal_rank(ranked: &[&str], judgments: &HashMap<String, i64>) -> f64 {
    ranked
        .iter()
        .position(|docno| gain(judgments, docno) > 0.0)
        .map(|position| 1.0 / (position + 1) as f64)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const RUN: &str = "1 Q0 doc-1 1 10 tag
1 Q0 doc-2 2 9 tag
3 Q0 doc-3 1 1 tag
5 Q0 doc-1 1 10 tag
5 Q0 doc-2 2 9 tag
5 Q0 doc-3 3 8 tag
5 Q0 doc-4 4 7 tag
5 Q0 doc-5 6 6 tag
5 Q0 doc-6 7 5 tag
5 Q0 doc-7 8 4 tag
";

    const QRELS: &str = "1 0 doc-1 0
1 0 doc-2 1
1 0 doc-3 2
3 0 doc-5 1
5 0 doc-2 1
5 0 doc-3 0
5 0 doc-4 0
5 0 doc-5 0
5 0 doc-6 0
5 0 doc-7 0
";

    fn artifact(dir: &Path, name: &str, content: &str) -> Artifact {
        std::fs::write(dir.join(name), content).unwrap();
        Artifact {
            dir: dir.to_path_buf(),
            format: name.to_string(),
        }
    }

    fn all_measures() -> Vec<String> {
        vec![NDCG_10.to_string(), P_10.to_string(), RR.to_string()]
    }

    fn value(measures: &Measures, name: &str) -> f64 {
        measures[name].as_f64().unwrap()
    }

    #[test]
    fn test_measures_on_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let run = artifact(dir.path(), "run.txt", RUN);
        let truth = artifact(dir.path(), "qrels.txt", QRELS);

        let measures = RankingEvaluator
            .compute(&run, Some(&truth), &all_measures())
            .unwrap();

        assert!((value(&measures, NDCG_10) - 0.290247).abs() < 1e-5);
        assert!((value(&measures, RR) - 0.333333).abs() < 1e-5);
        assert!((value(&measures, P_10) - 0.0666667).abs() < 1e-5);
    }

    #[test]
    fn test_only_requested_measures_are_returned() {
        let dir = tempfile::tempdir().unwrap();
        let run = artifact(dir.path(), "run.txt", RUN);
        let truth = artifact(dir.path(), "qrels.txt", QRELS);

        let measures = RankingEvaluator
            .compute(&run, Some(&truth), &[RR.to_string()])
            .unwrap();
        assert_eq!(measures.len(), 1);
        assert!(measures.contains_key(RR));
    }

    #[test]
    fn test_zero_relevance_yields_zero() {
        let dir = tempfile::tempdir().unwrap();
        let zero_qrels: String = QRELS
            .lines()
            .map(|line| {
                let mut columns: Vec<&str> = line.split_whitespace().collect();
                columns[3] = "0";
                columns.join(" ") + "\n"
            })
            .collect();
        let run = artifact(dir.path(), "run.txt", RUN);
        let truth = artifact(dir.path(), "qrels.txt", &zero_qrels);

        let measures = RankingEvaluator
            .compute(&run, Some(&truth), &all_measures())
            .unwrap();

        for name in [NDCG_10, P_10, RR] {
            assert_eq!(value(&measures, name), 0.0, "{}", name);
        }
    }

    #[test]
    fn test_missing_query_in_run_names_query() {
        let dir = tempfile::tempdir().unwrap();
        let run = artifact(dir.path(), "run.txt", "1 Q0 doc-1 1 10 tag\n");
        let truth = artifact(dir.path(), "qrels.txt", QRELS);

        let err = RankingEvaluator
            .compute(&run, Some(&truth), &all_measures())
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("\"3\""));
    }

    #[test]
    fn test_qrels_content_is_not_a_run() {
        let dir = tempfile::tempdir().unwrap();
        let run = artifact(dir.path(), "run.txt", QRELS);
        let truth = artifact(dir.path(), "qrels.txt", QRELS);

        let err = RankingEvaluator
            .compute(&run, Some(&truth), &all_measures())
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("expected 6 columns"));
    }

    #[test]
    fn test_ties_break_on_docno_descending() {
        let docs = vec![
            RetrievedDoc {
                docno: "a".to_string(),
                score: 1.0,
            },
            RetrievedDoc {
                docno: "b".to_string(),
                score: 1.0,
            },
            RetrievedDoc {
                docno: "c".to_string(),
                score: 2.0,
            },
        ];
        assert_eq!(ranked_docnos(&docs), vec!["c", "b", "a"]);
    }
}
