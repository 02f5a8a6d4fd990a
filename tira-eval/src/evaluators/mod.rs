//! Evaluator plugins
//!
//! Each evaluator computes a subset of the registered measures for one pair of
//! artifact formats. Evaluators are constructed per dispatch call.

mod labels;
mod ranking;
mod run_file;
mod text;

pub use labels::LabelEvaluator;
pub use ranking::RankingEvaluator;
pub use run_file::RunFileEvaluator;
pub use text::TextEvaluator;

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tira_core::domain::evaluator::FormatSpec;

use crate::error::{EvalError, Result};
use crate::registry::EvaluatorKind;

/// Flat map of measure name to value
pub type Measures = BTreeMap<String, Value>;

/// Interface every evaluator implements
pub trait Evaluator {
    fn kind(&self) -> EvaluatorKind;

    /// Run formats this evaluator reads (`*.ext` matches any file name with that extension)
    fn run_formats(&self) -> &'static [&'static str];

    /// Truth formats this evaluator reads, `None` if it ignores the ground truth
    fn truth_formats(&self) -> Option<&'static [&'static str]>;

    /// Computes exactly the requested measures
    fn compute(
        &self,
        run: &Artifact,
        truth: Option<&Artifact>,
        measures: &[String],
    ) -> Result<Measures>;

    /// Rejects declared formats this evaluator cannot read
    fn validate(&self, run_format: &FormatSpec, truth_format: &FormatSpec) -> Result<()> {
        check_formats(self.kind(), "run", run_format, self.run_formats())?;
        if let Some(accepted) = self.truth_formats() {
            check_formats(self.kind(), "truth", truth_format, accepted)?;
        }
        Ok(())
    }
}

/// Creates the evaluator for a kind
pub fn instantiate(kind: EvaluatorKind) -> Box<dyn Evaluator> {
    match kind {
        EvaluatorKind::Ranking => Box::new(RankingEvaluator),
        EvaluatorKind::RunFile => Box::new(RunFileEvaluator),
        EvaluatorKind::Label => Box::new(LabelEvaluator),
        EvaluatorKind::Text => Box::new(TextEvaluator),
    }
}

fn check_formats(
    kind: EvaluatorKind,
    side: &str,
    declared: &FormatSpec,
    accepted: &[&str],
) -> Result<()> {
    let supported = declared
        .candidates()
        .iter()
        .any(|format| accepted.iter().any(|pattern| format_matches(pattern, format)));

    if supported {
        Ok(())
    } else {
        Err(EvalError::validation(format!(
            "The {} evaluator does not support the {} format \"{}\", expected one of: {}.",
            kind,
            side,
            declared,
            accepted.join(", ")
        )))
    }
}

/// Whether a declared format or file name matches a format pattern
pub(crate) fn format_matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) => name.ends_with(suffix),
        None => pattern == name,
    }
}

// =============================================================================
// Artifacts
// =============================================================================

/// One side of an evaluation, a directory read in a resolved format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub dir: PathBuf,
    pub format: String,
}

impl Artifact {
    /// Picks the first declared format with files present in `dir`
    ///
    /// Only formats accepted by the evaluator are considered.
    pub fn resolve(
        dir: &Path,
        declared: &FormatSpec,
        accepted: &[&str],
        side: &str,
    ) -> Result<Self> {
        let candidates: Vec<&str> = declared
            .candidates()
            .into_iter()
            .filter(|format| accepted.iter().any(|pattern| format_matches(pattern, format)))
            .collect();

        for format in &candidates {
            let artifact = Self {
                dir: dir.to_path_buf(),
                format: format.to_string(),
            };
            if !artifact.files()?.is_empty() {
                return Ok(artifact);
            }
        }

        Err(EvalError::validation(format!(
            "The {} directory {} contains no file in the format {}.",
            side,
            dir.display(),
            declared
        )))
    }

    /// Files of this artifact, sorted by name
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if !self.format.starts_with('*') {
            let path = self.dir.join(&self.format);
            return Ok(if path.is_file() { vec![path] } else { Vec::new() });
        }

        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| EvalError::io(&self.dir, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| EvalError::io(&self.dir, e))?.path();
            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| format_matches(&self.format, name));
            if matches && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Non-empty lines of all files with their origin, for error messages
    pub fn lines(&self) -> Result<Vec<SourceLine>> {
        let mut lines = Vec::new();
        for path in self.files()? {
            let content = std::fs::read_to_string(&path).map_err(|e| EvalError::io(&path, e))?;
            for (index, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                lines.push(SourceLine {
                    file: path.clone(),
                    number: index + 1,
                    text: line.to_string(),
                });
            }
        }
        Ok(lines)
    }
}

/// A line read from an artifact file
#[derive(Debug, Clone)]
pub struct SourceLine {
    pub file: PathBuf,
    pub number: usize,
    pub text: String,
}

impl SourceLine {
    /// Validation error pointing at this line
    pub fn error(&self, message: impl std::fmt::Display) -> EvalError {
        EvalError::validation(format!(
            "{}:{}: {}",
            self.file.display(),
            self.number,
            message
        ))
    }
}

/// Keeps only the requested measures of a computed set
pub(crate) fn select(all: Measures, measures: &[String]) -> Measures {
    all.into_iter()
        .filter(|(name, _)| measures.contains(name))
        .collect()
}
