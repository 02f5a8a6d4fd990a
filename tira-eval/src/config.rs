//! Evaluator configuration resolution
//!
//! A caller names its evaluator either inline or through a dataset. Dataset
//! references resolve to the dataset's trusted evaluator; an absent or
//! untrusted evaluator is rejected since it would have to run in the sandbox.

use std::collections::HashMap;
use tira_core::domain::evaluator::{EvaluatorConfig, EvaluatorReference, FormatSpec};
use tracing::debug;

use crate::error::{EvalError, Result};

/// Evaluator configured for a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetEvaluator {
    pub config: EvaluatorConfig,

    /// Whether the evaluator may run outside the sandbox
    pub trusted: bool,
}

/// Lookup of dataset evaluators, implemented by the persistence layer
pub trait DatasetCatalog {
    fn evaluator(&self, dataset_id: &str) -> Option<DatasetEvaluator>;
}

impl DatasetCatalog for HashMap<String, DatasetEvaluator> {
    fn evaluator(&self, dataset_id: &str) -> Option<DatasetEvaluator> {
        self.get(dataset_id).cloned()
    }
}

/// A configuration whose required fields are known to be present
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub measures: Vec<String>,
    pub run_format: FormatSpec,
    pub truth_format: FormatSpec,
    pub config: EvaluatorConfig,
}

/// Checks that `measures`, `run_format` and `truth_format` are present
pub fn validate(config: &EvaluatorConfig) -> Result<ValidatedConfig> {
    let measures = config
        .measures
        .clone()
        .ok_or_else(|| invalid("\"measures\" is missing."))?;
    if measures.is_empty() {
        return Err(invalid("No measures are specified."));
    }

    let run_format = config
        .run_format
        .clone()
        .ok_or_else(|| invalid("\"run_format\" is missing."))?;
    let truth_format = config
        .truth_format
        .clone()
        .ok_or_else(|| invalid("\"truth_format\" is missing."))?;

    if run_format.candidates().is_empty() {
        return Err(invalid("\"run_format\" lists no format."));
    }
    if truth_format.candidates().is_empty() {
        return Err(invalid("\"truth_format\" lists no format."));
    }

    Ok(ValidatedConfig {
        measures,
        run_format,
        truth_format,
        config: config.clone(),
    })
}

fn invalid(reason: &str) -> EvalError {
    EvalError::config(format!(
        "Configuration of the evaluator is invalid: {}",
        reason
    ))
}

/// Cache of resolved dataset evaluator configurations
///
/// Owned by the caller and handed to every resolution. Entries stay until
/// [`invalidate`](Self::invalidate) or [`clear`](Self::clear) is called, for
/// example after a dataset's evaluator was edited.
#[derive(Debug, Default)]
pub struct EvaluatorConfigCache {
    entries: HashMap<String, EvaluatorConfig>,
}

impl EvaluatorConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a reference to a concrete configuration
    pub fn resolve(
        &mut self,
        catalog: &dyn DatasetCatalog,
        reference: &EvaluatorReference,
    ) -> Result<EvaluatorConfig> {
        let dataset_id = match reference {
            EvaluatorReference::Inline(config) => return Ok(config.clone()),
            EvaluatorReference::Dataset(dataset_id) => dataset_id,
        };

        if let Some(config) = self.entries.get(dataset_id) {
            debug!("Evaluator config cache hit for dataset {}", dataset_id);
            return Ok(config.clone());
        }

        let config = match catalog.evaluator(dataset_id) {
            Some(evaluator) if evaluator.trusted => evaluator.config,
            _ => {
                return Err(EvalError::config(format!(
                    "No trusted evaluation is configured for the dataset \"{}\".",
                    dataset_id
                )));
            }
        };

        self.entries.insert(dataset_id.clone(), config.clone());
        Ok(config)
    }

    /// Drops the cached configuration of one dataset
    pub fn invalidate(&mut self, dataset_id: &str) -> bool {
        self.entries.remove(dataset_id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking_config() -> EvaluatorConfig {
        EvaluatorConfig {
            measures: Some(vec!["P@10".to_string()]),
            run_format: Some(FormatSpec::from("run.txt")),
            truth_format: Some(FormatSpec::from("qrels.txt")),
            ..Default::default()
        }
    }

    fn catalog() -> HashMap<String, DatasetEvaluator> {
        let mut catalog = HashMap::new();
        catalog.insert(
            "trusted-dataset".to_string(),
            DatasetEvaluator {
                config: ranking_config(),
                trusted: true,
            },
        );
        catalog.insert(
            "sandboxed-dataset".to_string(),
            DatasetEvaluator {
                config: ranking_config(),
                trusted: false,
            },
        );
        catalog
    }

    #[test]
    fn test_validate_names_missing_field() {
        let mut config = ranking_config();
        config.truth_format = None;
        let err = validate(&config).unwrap_err();
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "Configuration of the evaluator is invalid: \"truth_format\" is missing."
        );

        config.measures = Some(Vec::new());
        assert_eq!(
            validate(&config).unwrap_err().to_string(),
            "Configuration of the evaluator is invalid: No measures are specified."
        );
    }

    #[test]
    fn test_resolve_trusted_dataset_is_cached() {
        let mut cache = EvaluatorConfigCache::new();
        let reference = EvaluatorReference::Dataset("trusted-dataset".to_string());

        let config = cache.resolve(&catalog(), &reference).unwrap();
        assert_eq!(config, ranking_config());
        assert_eq!(cache.len(), 1);

        // Served from the cache even though the catalog no longer knows the dataset
        let empty: HashMap<String, DatasetEvaluator> = HashMap::new();
        assert!(cache.resolve(&empty, &reference).is_ok());

        assert!(cache.invalidate("trusted-dataset"));
        assert!(cache.resolve(&empty, &reference).is_err());
    }

    #[test]
    fn test_resolve_rejects_untrusted_and_absent() {
        let mut cache = EvaluatorConfigCache::new();

        for dataset in ["sandboxed-dataset", "unknown-dataset"] {
            let err = cache
                .resolve(&catalog(), &EvaluatorReference::Dataset(dataset.to_string()))
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                format!(
                    "No trusted evaluation is configured for the dataset \"{}\".",
                    dataset
                )
            );
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_resolve_inline_bypasses_cache() {
        let mut cache = EvaluatorConfigCache::new();
        let config = cache
            .resolve(&catalog(), &EvaluatorReference::Inline(ranking_config()))
            .unwrap();
        assert_eq!(config, ranking_config());
        assert!(cache.is_empty());
    }
}
