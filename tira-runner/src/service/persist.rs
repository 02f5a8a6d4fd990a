//! CI persistence step
//!
//! Runs after the user command of a CI pipeline. Copies the job output into
//! the run directory, writes the diagnostics from the CI job log, processes
//! profiling data, merges the job branch back into the trunk and confirms the
//! job with the coordinator.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tira_core::domain::descriptor::{JobDescriptor, keys};
use tira_core::domain::diagnostics::OUTPUT_DIR;
use tracing::{info, warn};

use crate::diagnostics::{Diagnostics, write_diagnostics};
use crate::git::log_extract::{extract_command, extract_output};
use crate::git::{CiPlatform, MergeRetry, ci_job_name, merge_branch};
use crate::profiling::process_profiling;
use crate::repository::CoordinatorRepository;
use crate::staging::copy_dir;

/// Environment every persistence step needs
pub const REQUIRED_ENV: [&str; 5] = [
    keys::DATASET_ID,
    keys::VM_ID,
    keys::RUN_ID,
    keys::OUTPUT_DIR,
    keys::TASK_ID,
];

/// Where a persisted run ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOutcome {
    pub run_dir: PathBuf,
    pub merged_branch: Option<String>,
}

pub struct PersistService {
    platform: Arc<dyn CiPlatform>,
    coordinator: Arc<dyn CoordinatorRepository>,
    runs_dir: PathBuf,
    merge_retry: MergeRetry,
}

impl PersistService {
    /// Creates the persistence step
    ///
    /// # Arguments
    /// * `platform` - CI platform the job ran on
    /// * `coordinator` - Receiver of the confirmation
    /// * `runs_dir` - Root of the persisted run directories
    pub fn new(
        platform: Arc<dyn CiPlatform>,
        coordinator: Arc<dyn CoordinatorRepository>,
        runs_dir: PathBuf,
    ) -> Self {
        Self {
            platform,
            coordinator,
            runs_dir,
            merge_retry: MergeRetry::default(),
        }
    }

    pub fn with_merge_retry(mut self, merge_retry: MergeRetry) -> Self {
        self.merge_retry = merge_retry;
        self
    }

    /// Persists the job described by the `TIRA_*` entries of the CI environment
    pub async fn persist(&self, env: &[(String, String)]) -> Result<PersistOutcome> {
        let missing: Vec<&str> = REQUIRED_ENV
            .iter()
            .filter(|key| !env.iter().any(|(k, _)| k == *key))
            .copied()
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
        }

        let entries: Vec<(&str, &str)> = env
            .iter()
            .filter(|(k, _)| k.starts_with("TIRA_"))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let descriptor = JobDescriptor::from_entries(&entries).context("Invalid job environment")?;
        let run = descriptor.run_key();
        info!("Persisting {}", run);

        let log = self.platform.job_log(ci_job_name(&descriptor)).await?;
        let output = extract_output(&log)?;
        let command = extract_command(&log)?;

        let run_dir = self
            .runs_dir
            .join(&run.dataset_id)
            .join(&run.vm_id)
            .join(&run.run_id);
        copy_output(&descriptor.task_output_dir(), &run_dir.join(OUTPUT_DIR))?;

        write_diagnostics(
            &run_dir,
            &descriptor,
            &Diagnostics {
                command,
                stdout: format!("{}\n", output),
                stderr: String::new(),
            },
        )?;
        process_profiling(&run_dir)?;

        let merged_branch = match &descriptor.git_id {
            Some(branch) => {
                merge_branch(self.platform.as_ref(), branch, &self.merge_retry).await?;
                Some(branch.clone())
            }
            None => {
                warn!("{} carries no {}, nothing to merge", run, keys::GIT_ID);
                None
            }
        };

        match descriptor.evaluated_run() {
            Some(evaluated) => {
                self.coordinator
                    .confirm_evaluation(evaluated, true, "persisted from CI", None)
                    .await?
            }
            None => {
                self.coordinator
                    .confirm_execution(&run, true, "persisted from CI")
                    .await?
            }
        }

        Ok(PersistOutcome {
            run_dir,
            merged_branch,
        })
    }
}

/// Copies the job output unless the run already has one
fn copy_output(source: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        info!("{} exists already, not overwriting", target.display());
        return Ok(());
    }
    if !source.exists() {
        std::fs::create_dir_all(source)
            .with_context(|| format!("Failed to create {}", source.display()))?;
    }
    copy_dir(source, target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeCiPlatform;
    use crate::repository::RecordingCoordinator;
    use std::time::Duration;
    use tira_core::domain::diagnostics::{RUN_DESCRIPTOR_FILE, STDERR_FILE, STDOUT_FILE};

    const LOG: &str = "\u{1b}[32;1m$ echo \"${TIRA_COMMAND_TO_EXECUTE}\"\u{1b}[0;m\n\
/app/run.sh\n\
\u{1b}[32;1m$ eval \"${TIRA_COMMAND_TO_EXECUTE}\"\u{1b}[0;m\n\
wrote 2 lines\n\
\u{1b}[32;1m$ env|grep 'TIRA' > task.env\u{1b}[0;m\n";

    fn env(job_dir: &Path) -> Vec<(String, String)> {
        [
            (keys::TASK_ID, "task-1".to_string()),
            (keys::DATASET_ID, "dataset-1".to_string()),
            (keys::VM_ID, "vm-1".to_string()),
            (keys::RUN_ID, "2024-01-01-10-00-00".to_string()),
            (keys::IMAGE, "alpine".to_string()),
            (keys::COMMAND, "/app/run.sh".to_string()),
            (keys::OUTPUT_DIR, job_dir.to_string_lossy().to_string()),
            (keys::DATASET_TYPE, "test".to_string()),
            (keys::SOFTWARE_ID, "software-1".to_string()),
            (
                keys::GIT_ID,
                "run---dataset-1---vm-1---2024-01-01-10-00-00---started-2024-01-01-10-00-01"
                    .to_string(),
            ),
            ("HOME", "/root".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn service(
        platform: Arc<FakeCiPlatform>,
        coordinator: Arc<RecordingCoordinator>,
        runs_dir: PathBuf,
    ) -> PersistService {
        PersistService::new(platform, coordinator, runs_dir).with_merge_retry(MergeRetry {
            attempts: 2,
            initial: Duration::from_millis(1),
            max: Duration::from_millis(1),
        })
    }

    #[tokio::test]
    async fn test_persist_writes_diagnostics_merges_and_confirms() {
        let root = tempfile::tempdir().unwrap();
        let job_dir = root.path().join("ci/job");
        std::fs::create_dir_all(job_dir.join("output")).unwrap();
        std::fs::write(job_dir.join("output/run.txt"), "a\nb\n").unwrap();

        let platform = Arc::new(FakeCiPlatform::new());
        platform.add_job_log("run-user-software", LOG);
        let coordinator = Arc::new(RecordingCoordinator::default());

        let outcome = service(platform.clone(), coordinator.clone(), root.path().join("runs"))
            .persist(&env(&job_dir))
            .await
            .unwrap();

        let run_dir = root.path().join("runs/dataset-1/vm-1/2024-01-01-10-00-00");
        assert_eq!(outcome.run_dir, run_dir);
        assert_eq!(
            std::fs::read_to_string(run_dir.join("output/run.txt")).unwrap(),
            "a\nb\n"
        );
        assert_eq!(
            std::fs::read_to_string(run_dir.join(STDOUT_FILE)).unwrap(),
            "wrote 2 lines\n"
        );
        assert!(
            std::fs::read_to_string(run_dir.join(STDERR_FILE))
                .unwrap()
                .contains("/app/run.sh")
        );
        assert!(run_dir.join(RUN_DESCRIPTOR_FILE).exists());

        assert_eq!(platform.merged().len(), 1);
        let executions = coordinator.executions.lock().unwrap().clone();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].0.run_id, "2024-01-01-10-00-00");
        assert!(executions[0].1);
    }

    #[tokio::test]
    async fn test_existing_output_is_not_overwritten() {
        let root = tempfile::tempdir().unwrap();
        let job_dir = root.path().join("ci/job");
        std::fs::create_dir_all(job_dir.join("output")).unwrap();
        std::fs::write(job_dir.join("output/run.txt"), "new\n").unwrap();
        let existing = root.path().join("runs/dataset-1/vm-1/2024-01-01-10-00-00/output");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("run.txt"), "old\n").unwrap();

        let platform = Arc::new(FakeCiPlatform::new());
        platform.add_job_log("run-user-software", LOG);
        service(platform, Arc::new(RecordingCoordinator::default()), root.path().join("runs"))
            .persist(&env(&job_dir))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(existing.join("run.txt")).unwrap(), "old\n");
    }

    #[tokio::test]
    async fn test_missing_env_is_listed() {
        let root = tempfile::tempdir().unwrap();
        let env: Vec<(String, String)> = env(root.path())
            .into_iter()
            .filter(|(k, _)| k != keys::VM_ID && k != keys::TASK_ID)
            .collect();

        let platform = Arc::new(FakeCiPlatform::new());
        let err = service(platform, Arc::new(RecordingCoordinator::default()), root.path().join("runs"))
            .persist(&env)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains(keys::VM_ID));
        assert!(message.contains(keys::TASK_ID));
    }

    #[tokio::test]
    async fn test_changed_log_format_fails_before_confirming() {
        let root = tempfile::tempdir().unwrap();
        let platform = Arc::new(FakeCiPlatform::new());
        platform.add_job_log("run-user-software", "no markers here");
        let coordinator = Arc::new(RecordingCoordinator::default());

        let err = service(platform.clone(), coordinator.clone(), root.path().join("runs"))
            .persist(&env(&root.path().join("job")))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("format of the CI log"));
        assert!(coordinator.executions.lock().unwrap().is_empty());
        assert!(platform.merged().is_empty());
    }
}
