//! Git-CI integration
//!
//! Jobs are dispatched by committing their descriptor file to a fresh branch
//! of the CI repository. The branch name identifies the job, so the names of
//! active pipelines are all that is needed to avoid dispatching a job twice.

pub mod gitlab;
pub mod log_extract;
pub mod merge;

#[cfg(test)]
pub mod fake;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tira_core::domain::descriptor::JobDescriptor;
use tira_core::domain::run::RUN_ID_FORMAT;

pub use gitlab::GitLabPlatform;
pub use merge::{MergeRetry, merge_branch};

/// Pipeline states in which a job counts as dispatched
pub const ACTIVE_PIPELINE_STATES: [&str; 6] = [
    "scheduled",
    "running",
    "pending",
    "created",
    "waiting_for_resource",
    "preparing",
];

const STARTED_SEPARATOR: &str = "---started-";

/// Operations the dispatcher and the persistence step need from the CI platform
#[async_trait]
pub trait CiPlatform: Send + Sync {
    /// Refs of all pipelines in one of the [`ACTIVE_PIPELINE_STATES`]
    async fn active_pipeline_refs(&self) -> Result<Vec<String>>;

    /// Creates `branch` from the trunk with one committed file and pushes it
    ///
    /// # Arguments
    /// * `branch` - Name of the new branch
    /// * `path` - File path relative to the repository root
    /// * `content` - File content
    /// * `message` - Commit message
    async fn push_job_branch(
        &self,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<()>;

    /// Merges `branch` into the trunk inside the existing checkout, skipping CI
    async fn merge_in_place(&self, branch: &str) -> Result<()>;

    /// Merges `branch` into the trunk from a fresh clone, skipping CI
    async fn merge_from_fresh_clone(&self, branch: &str) -> Result<()>;

    /// Raw log of a job of the current pipeline
    async fn job_log(&self, job_name: &str) -> Result<String>;
}

/// Kind prefix of a job branch
pub fn branch_kind(descriptor: &JobDescriptor) -> &'static str {
    if descriptor.is_evaluation() { "eval" } else { "run" }
}

/// `<kind>---<dataset>---<vm>---<run>`, the part of a branch name identifying the job
///
/// Evaluations are identified by the run they evaluate, so two evaluations
/// of one run share an identifier whatever their own run ids.
pub fn job_identifier(descriptor: &JobDescriptor) -> String {
    let run = match descriptor.evaluated_run() {
        Some(evaluated) => evaluated.clone(),
        None => descriptor.run_key(),
    };
    format!(
        "{}---{}---{}---{}",
        branch_kind(descriptor),
        run.dataset_id,
        run.vm_id,
        run.run_id
    )
}

/// Branch name of a job started at `started`
pub fn branch_name(descriptor: &JobDescriptor, started: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        job_identifier(descriptor),
        STARTED_SEPARATOR,
        started.format(RUN_ID_FORMAT)
    )
}

/// Job identifier of a pipeline ref, the ref itself if it carries no start time
pub fn identifier_of_ref(pipeline_ref: &str) -> &str {
    pipeline_ref
        .split_once(STARTED_SEPARATOR)
        .map(|(identifier, _)| identifier)
        .unwrap_or(pipeline_ref)
}

/// Job names of the CI pipeline definition
pub fn ci_job_name(descriptor: &JobDescriptor) -> &'static str {
    if descriptor.is_evaluation() {
        "evaluate-software-result"
    } else {
        "run-user-software"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tira_core::domain::descriptor::{DatasetType, EvaluatorSoftware};
    use tira_core::domain::run::RunKey;

    fn execution() -> JobDescriptor {
        JobDescriptor::execution(
            RunKey::new("dataset-1", "vm-1", "2024-01-01-10-00-00"),
            "task-1",
            "alpine",
            "true",
            "/runs/dataset-1/vm-1/2024-01-01-10-00-00",
            DatasetType::Test,
        )
    }

    #[test]
    fn test_branch_name_is_deterministic() {
        let started = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            branch_name(&execution(), started),
            "run---dataset-1---vm-1---2024-01-01-10-00-00---started-2024-01-02-03-04-05"
        );
    }

    #[test]
    fn test_evaluation_branch_kind() {
        let job = JobDescriptor::evaluation(
            RunKey::new("dataset-1", "vm-1", "2024-01-03-00-00-00"),
            "task-1",
            RunKey::new("dataset-1", "vm-1", "2024-01-01-10-00-00"),
            EvaluatorSoftware {
                image: "evaluator".to_string(),
                command: "evaluate".to_string(),
                software_id: None,
            },
            "/runs",
            DatasetType::Test,
        );
        assert_eq!(job_identifier(&job), "eval---dataset-1---vm-1---2024-01-01-10-00-00");
        assert_eq!(ci_job_name(&job), "evaluate-software-result");
    }

    #[test]
    fn test_identifier_of_ref() {
        assert_eq!(
            identifier_of_ref("run---d---v---r---started-2024-01-02-03-04-05"),
            "run---d---v---r"
        );
        assert_eq!(identifier_of_ref("main"), "main");
    }
}
