//! Local evaluation
//!
//! Runs the evaluator dispatch engine on a run directory without involving
//! the coordinator. The evaluator is given inline or looked up in a catalog
//! file mapping dataset ids to evaluators.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tira_core::domain::evaluator::{EvaluatorConfig, EvaluatorReference};
use tira_eval::prototext::write_evaluation;
use tira_eval::{DatasetEvaluator, EvaluationResult, EvaluatorConfigCache, evaluate_reference};

#[derive(Args)]
pub struct EvaluateArgs {
    /// Directory holding the run artifact
    #[arg(long)]
    run: PathBuf,

    /// Directory holding the ground truth
    #[arg(long)]
    truth: PathBuf,

    /// Evaluator configuration (JSON)
    #[arg(long, conflicts_with = "dataset", required_unless_present = "dataset")]
    config: Option<PathBuf>,

    /// Dataset whose trusted evaluator is used, looked up in --catalog
    #[arg(long, requires = "catalog")]
    dataset: Option<String>,

    /// Catalog (JSON object of dataset id to `{"config": ..., "trusted": bool}`)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Also write evaluation.prototext into this directory
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    config: EvaluatorConfig,
    #[serde(default)]
    trusted: bool,
}

/// Handle the evaluate command
pub fn handle_evaluate(args: EvaluateArgs) -> Result<()> {
    let (reference, catalog) = match (&args.config, &args.dataset) {
        (Some(path), _) => (EvaluatorReference::Inline(read_json(path)?), HashMap::new()),
        (None, Some(dataset)) => {
            let catalog = match &args.catalog {
                Some(path) => load_catalog(path)?,
                None => anyhow::bail!("--dataset needs --catalog"),
            };
            (EvaluatorReference::Dataset(dataset.clone()), catalog)
        }
        (None, None) => anyhow::bail!("Either --config or --dataset is required"),
    };

    let mut cache = EvaluatorConfigCache::new();
    let result = evaluate_reference(&mut cache, &catalog, &reference, &args.run, &args.truth)?;

    print_result(&result);

    if let Some(output) = &args.output {
        let path = write_evaluation(output, &result)?;
        println!();
        println!("{} {}", "Wrote".green(), path.display());
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn load_catalog(path: &Path) -> Result<HashMap<String, DatasetEvaluator>> {
    let entries: HashMap<String, CatalogEntry> = read_json(path)?;
    Ok(entries
        .into_iter()
        .map(|(dataset, entry)| {
            (
                dataset,
                DatasetEvaluator {
                    config: entry.config,
                    trusted: entry.trusted,
                },
            )
        })
        .collect())
}

fn print_result(result: &EvaluationResult) {
    let measures = result.flatten();
    if measures.is_empty() {
        println!("{}", "No measures computed.".yellow());
        return;
    }

    println!("{}", format!("Computed {} measure(s):", measures.len()).bold());
    let width = measures.keys().map(String::len).max().unwrap_or(0);
    for (name, value) in &measures {
        println!("  {}  {}", format!("{:width$}", name, width = width).cyan(), value);
    }
}
