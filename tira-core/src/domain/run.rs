//! Run domain model
//!
//! A run is one execution of a participant's software (or an evaluation of
//! such an execution) against a dataset.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Format of generated run identifiers
pub const RUN_ID_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Identifies a run within the (dataset, vm) namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunKey {
    pub dataset_id: String,
    pub vm_id: String,
    pub run_id: String,
}

impl RunKey {
    pub fn new(
        dataset_id: impl Into<String>,
        vm_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            vm_id: vm_id.into(),
            run_id: run_id.into(),
        }
    }

    /// Parses a `dataset/vm/run` triple
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('/');
        let dataset_id = parts.next().filter(|s| !s.is_empty())?;
        let vm_id = parts.next().filter(|s| !s.is_empty())?;
        let run_id = parts.next().filter(|s| !s.is_empty())?;

        if parts.next().is_some() {
            return None;
        }

        Some(Self::new(dataset_id, vm_id, run_id))
    }
}

impl std::fmt::Display for RunKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.dataset_id, self.vm_id, self.run_id)
    }
}

/// Run record
///
/// Structure shared between coordinator (persists) and runner (produces output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub key: RunKey,
    pub software_id: Option<String>,

    /// The run this one consumes or evaluates
    pub input_run_id: Option<String>,
    pub is_evaluation: bool,
    pub downloadable: bool,
    pub deleted: bool,
    pub lifecycle: RunLifecycle,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a run
///
/// States only move forward: `Created -> Executed -> Evaluated -> Reviewed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunLifecycle {
    Created,
    Executed,
    Evaluated,
    Reviewed,
}

impl RunLifecycle {
    /// Returns the later of the current and the requested state
    pub fn advance(self, to: RunLifecycle) -> RunLifecycle {
        self.max(to)
    }
}

impl std::fmt::Display for RunLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunLifecycle::Created => write!(f, "Created"),
            RunLifecycle::Executed => write!(f, "Executed"),
            RunLifecycle::Evaluated => write!(f, "Evaluated"),
            RunLifecycle::Reviewed => write!(f, "Reviewed"),
        }
    }
}

/// Formats a timestamp as a run identifier
pub fn run_id_at(timestamp: DateTime<Utc>) -> String {
    timestamp.format(RUN_ID_FORMAT).to_string()
}

/// Candidate run identifiers starting at `timestamp`, one second apart
///
/// Callers take the first candidate their store accepts.
pub fn run_id_candidates(timestamp: DateTime<Utc>) -> impl Iterator<Item = String> {
    (0..).map(move |offset| run_id_at(timestamp + Duration::seconds(offset)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_key_parse() {
        let key = RunKey::parse("dataset-2/vm-1/run-3").unwrap();
        assert_eq!(key, RunKey::new("dataset-2", "vm-1", "run-3"));
        assert_eq!(key.to_string(), "dataset-2/vm-1/run-3");
    }

    #[test]
    fn test_run_key_parse_rejects_malformed() {
        assert!(RunKey::parse("dataset-2/vm-1").is_none());
        assert!(RunKey::parse("a/b/c/d").is_none());
        assert!(RunKey::parse("a//c").is_none());
    }

    #[test]
    fn test_lifecycle_only_moves_forward() {
        assert_eq!(
            RunLifecycle::Created.advance(RunLifecycle::Executed),
            RunLifecycle::Executed
        );
        assert_eq!(
            RunLifecycle::Evaluated.advance(RunLifecycle::Executed),
            RunLifecycle::Evaluated
        );
    }

    #[test]
    fn test_run_id_candidates() {
        let t = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        let ids: Vec<String> = run_id_candidates(t).take(2).collect();
        assert_eq!(ids, vec!["2024-01-31-23-59-59", "2024-02-01-00-00-00"]);
    }
}
