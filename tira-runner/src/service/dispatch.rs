//! Git-CI dispatch service
//!
//! Dispatches a job by pushing its descriptor file on a fresh branch of the
//! CI repository. A job whose identifier is already the ref of an active
//! pipeline is not dispatched again.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tira_core::domain::descriptor::JobDescriptor;
use tira_core::dto::descriptor::{encode, job_file_path};
use tracing::info;

use crate::git::{CiPlatform, branch_name, identifier_of_ref, job_identifier};

/// Result of a dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A new branch was pushed
    Dispatched { branch: String },
    /// A pipeline for the same job is still active
    AlreadyActive { identifier: String },
}

/// Service trait for dispatching jobs to a CI system
#[async_trait]
pub trait DispatchService: Send + Sync {
    async fn dispatch(&self, descriptor: JobDescriptor) -> Result<DispatchOutcome>;
}

/// Dispatches jobs as branches of a CI repository
pub struct GitCiDispatchService {
    platform: Arc<dyn CiPlatform>,
}

impl GitCiDispatchService {
    pub fn new(platform: Arc<dyn CiPlatform>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl DispatchService for GitCiDispatchService {
    async fn dispatch(&self, mut descriptor: JobDescriptor) -> Result<DispatchOutcome> {
        let identifier = job_identifier(&descriptor);

        let active = self
            .platform
            .active_pipeline_refs()
            .await
            .context("Failed to list active pipelines")?;
        if active.iter().any(|r| identifier_of_ref(r) == identifier) {
            info!("Job {} already has an active pipeline, skipping", identifier);
            return Ok(DispatchOutcome::AlreadyActive { identifier });
        }

        let branch = branch_name(&descriptor, Utc::now());
        descriptor.git_id = Some(branch.clone());
        let content = encode(&descriptor).context("Failed to encode the job descriptor")?;
        let path = job_file_path(&descriptor);

        self.platform
            .push_job_branch(&branch, &path, &content, &format!("Add job {}", identifier))
            .await
            .with_context(|| format!("Failed to push branch {}", branch))?;

        info!("Dispatched {} on {}", identifier, branch);
        Ok(DispatchOutcome::Dispatched { branch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::fake::FakeCiPlatform;
    use tira_core::domain::descriptor::{DatasetType, EvaluatorSoftware};
    use tira_core::domain::run::RunKey;
    use tira_core::dto::descriptor::decode;

    fn descriptor() -> JobDescriptor {
        JobDescriptor::execution(
            RunKey::new("dataset-1", "vm-1", "2024-01-01-10-00-00"),
            "task-1",
            "alpine",
            "ls $inputDataset > $outputDir/run.txt",
            "/runs/dataset-1/vm-1/2024-01-01-10-00-00",
            DatasetType::Test,
        )
    }

    #[tokio::test]
    async fn test_dispatch_pushes_job_file() {
        let platform = Arc::new(FakeCiPlatform::new());
        let service = GitCiDispatchService::new(platform.clone());

        let outcome = service.dispatch(descriptor()).await.unwrap();
        let DispatchOutcome::Dispatched { branch } = outcome else {
            panic!("expected a dispatch");
        };
        assert!(branch.starts_with("run---dataset-1---vm-1---2024-01-01-10-00-00---started-"));

        let pushed = platform.pushed();
        assert_eq!(pushed.len(), 1);
        let (pushed_branch, path, content) = &pushed[0];
        assert_eq!(pushed_branch, &branch);
        assert_eq!(path, "dataset-1/vm-1/2024-01-01-10-00-00/job-to-execute.txt");

        let decoded = decode(content).unwrap();
        assert_eq!(decoded.git_id.as_deref(), Some(branch.as_str()));
        assert_eq!(decoded.command, "ls $inputDataset > $outputDir/run.txt");
    }

    #[tokio::test]
    async fn test_second_dispatch_is_a_no_op() {
        let platform = Arc::new(FakeCiPlatform::new());
        let service = GitCiDispatchService::new(platform.clone());

        service.dispatch(descriptor()).await.unwrap();
        let second = service.dispatch(descriptor()).await.unwrap();

        assert_eq!(
            second,
            DispatchOutcome::AlreadyActive {
                identifier: "run---dataset-1---vm-1---2024-01-01-10-00-00".to_string()
            }
        );
        assert_eq!(platform.pushed().len(), 1);
    }

    fn evaluation(run_id: &str) -> JobDescriptor {
        JobDescriptor::evaluation(
            RunKey::new("dataset-1", "vm-1", run_id),
            "task-1",
            RunKey::new("dataset-1", "vm-1", "run-1"),
            EvaluatorSoftware {
                image: "evaluator".to_string(),
                command: "evaluate".to_string(),
                software_id: None,
            },
            format!("/runs/dataset-1/vm-1/{}", run_id),
            DatasetType::Test,
        )
    }

    #[tokio::test]
    async fn test_new_evaluation_of_active_run_is_a_no_op() {
        let platform = Arc::new(FakeCiPlatform::new());
        platform.add_active_ref("eval---dataset-1---vm-1---run-1---started-2024-01-01-00-00-00");
        let service = GitCiDispatchService::new(platform.clone());

        let outcome = service.dispatch(evaluation("2024-02-01-00-00-00")).await.unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::AlreadyActive {
                identifier: "eval---dataset-1---vm-1---run-1".to_string()
            }
        );
        assert!(platform.pushed().is_empty());
    }

    #[tokio::test]
    async fn test_evaluation_branch_names_the_evaluated_run() {
        let platform = Arc::new(FakeCiPlatform::new());
        let service = GitCiDispatchService::new(platform.clone());

        let outcome = service.dispatch(evaluation("2024-02-01-00-00-00")).await.unwrap();
        let DispatchOutcome::Dispatched { branch } = outcome else {
            panic!("expected a dispatch");
        };
        assert!(branch.starts_with("eval---dataset-1---vm-1---run-1---started-"));
        assert_eq!(
            platform.pushed()[0].1,
            "dataset-1/vm-1/2024-02-01-00-00-00/job-to-execute.txt"
        );

        let again = service.dispatch(evaluation("2024-02-02-00-00-00")).await.unwrap();
        assert!(matches!(again, DispatchOutcome::AlreadyActive { .. }));
    }

    #[tokio::test]
    async fn test_other_jobs_do_not_block() {
        let platform = Arc::new(FakeCiPlatform::new());
        platform.add_active_ref("run---dataset-1---vm-2---2024-01-01-10-00-00---started-2024-01-01-10-00-01");
        platform.add_active_ref("main");
        let service = GitCiDispatchService::new(platform.clone());

        let outcome = service.dispatch(descriptor()).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Dispatched { .. }));
    }

    #[tokio::test]
    async fn test_invalid_descriptor_is_not_pushed() {
        let platform = Arc::new(FakeCiPlatform::new());
        let service = GitCiDispatchService::new(platform.clone());
        let mut job = descriptor();
        job.command = "echo a\necho b".to_string();

        assert!(service.dispatch(job).await.is_err());
        assert!(platform.pushed().is_empty());
    }
}
