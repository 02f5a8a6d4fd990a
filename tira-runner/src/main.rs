//! TIRA Runner
//!
//! Worker binary executing job descriptors.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Repositories: HTTP confirmations to the coordinator
//! - Services: Sandbox execution, trusted evaluation, CI dispatch, CI persistence
//! - Scheduler: Resource-class worker pool
//!
//! `run` executes descriptor files in the local container sandbox, `dispatch`
//! hands a descriptor to the Git-CI system and `persist` is the final step of
//! a CI pipeline.

mod config;
mod container;
mod diagnostics;
mod git;
mod hf_cache;
mod profiling;
mod repository;
mod scheduler;
mod service;
mod staging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tira_client::Backoff;
use tira_core::domain::descriptor::JobDescriptor;
use tira_core::domain::evaluator::EvaluatorConfig;
use tira_core::dto::descriptor::decode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::git::{CiPlatform, GitLabPlatform};
use crate::repository::{CoordinatorRepository, HttpCoordinatorRepository};
use crate::scheduler::WorkerPool;
use crate::service::{
    DispatchOutcome, DispatchService, ExecutionService, GitCiDispatchService, Job,
    PersistService, SandboxExecutionService,
};

#[derive(Parser)]
#[command(name = "tira-runner")]
#[command(about = "Executes TIRA jobs in a container sandbox or on a Git-CI system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run job descriptor files in the local sandbox
    Run {
        /// Job descriptor files (KEY=VALUE lines)
        #[arg(required = true)]
        descriptors: Vec<PathBuf>,

        /// Trusted evaluator configuration (JSON), evaluations use it in-process
        #[arg(long)]
        evaluator_config: Option<PathBuf>,
    },
    /// Dispatch a job descriptor file to the Git-CI system
    Dispatch {
        /// Job descriptor file
        descriptor: PathBuf,
    },
    /// Persist the result of the current CI job
    Persist,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tira_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    info!(
        "Loaded configuration: coordinator_url={}, runtime={}",
        config.coordinator_url, config.container_runtime
    );

    match cli.command {
        Command::Run {
            descriptors,
            evaluator_config,
        } => run(config, &descriptors, evaluator_config.as_deref()).await,
        Command::Dispatch { descriptor } => dispatch(&config, &descriptor).await,
        Command::Persist => persist(&config).await,
    }
}

async fn run(config: Config, files: &[PathBuf], evaluator_config: Option<&Path>) -> Result<()> {
    let jobs = prepare_jobs(files, evaluator_config)?;

    let executor: Arc<dyn ExecutionService> = Arc::new(SandboxExecutionService::new(config.clone()));
    let pool = Arc::new(WorkerPool::new(&config, executor, coordinator(&config)));
    info!(
        "Worker pool: {} gpu, {} general",
        config.gpu_workers, config.general_workers
    );

    let mut failed = 0;
    for (file, result) in files.iter().zip(pool.run_all(jobs).await) {
        match result {
            Ok(outcome) => info!("{}: {} ({})", file.display(), outcome.message, outcome.run),
            Err(e) => {
                failed += 1;
                error!("{}: {:#}", file.display(), e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} job(s) could not be run", failed, files.len());
    }
    Ok(())
}

async fn dispatch(config: &Config, file: &Path) -> Result<()> {
    let descriptor = read_descriptor(file)?;
    let service = GitCiDispatchService::new(ci_platform(config)?);

    match service.dispatch(descriptor).await? {
        DispatchOutcome::Dispatched { branch } => info!("Dispatched on branch {}", branch),
        DispatchOutcome::AlreadyActive { identifier } => {
            info!("{} is already running, nothing dispatched", identifier)
        }
    }
    Ok(())
}

async fn persist(config: &Config) -> Result<()> {
    let env: Vec<(String, String)> = std::env::vars().collect();
    let service = PersistService::new(ci_platform(config)?, coordinator(config), config.runs_dir.clone());

    let outcome = service.persist(&env).await?;
    info!("Persisted to {}", outcome.run_dir.display());
    Ok(())
}

/// Reads the evaluator configuration and every descriptor before the first job starts
fn prepare_jobs(files: &[PathBuf], evaluator_config: Option<&Path>) -> Result<Vec<Job>> {
    let trusted = evaluator_config.map(read_evaluator_config).transpose()?;

    files
        .iter()
        .map(|file| {
            let descriptor = read_descriptor(file)?;
            let trusted_evaluator = descriptor
                .is_evaluation()
                .then(|| trusted.clone())
                .flatten();
            Ok(Job {
                descriptor,
                trusted_evaluator,
            })
        })
        .collect()
}

fn read_evaluator_config(path: &Path) -> Result<EvaluatorConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let parsed: EvaluatorConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tira_eval::check(&parsed)
        .with_context(|| format!("Invalid evaluator configuration {}", path.display()))?;
    Ok(parsed)
}

fn read_descriptor(file: &Path) -> Result<JobDescriptor> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    decode(&content).with_context(|| format!("Invalid job descriptor {}", file.display()))
}

fn coordinator(config: &Config) -> Arc<dyn CoordinatorRepository> {
    Arc::new(HttpCoordinatorRepository::new(
        config.coordinator_url.clone(),
        Backoff::new(Duration::from_millis(500), config.confirm_backoff_max),
    ))
}

fn ci_platform(config: &Config) -> Result<Arc<dyn CiPlatform>> {
    let missing = |name: &str| anyhow::anyhow!("{} is required for the Git-CI backend", name);

    Ok(Arc::new(GitLabPlatform::new(
        config.ci_repo_dir.clone(),
        config.ci_trunk.clone(),
        config.ci_api_url.clone().ok_or_else(|| missing("TIRA_CI_API_URL"))?,
        config.ci_token.clone().ok_or_else(|| missing("TIRA_CI_TOKEN"))?,
        config.ci_project_id.clone().ok_or_else(|| missing("CI_PROJECT_ID"))?,
        config.ci_pipeline_id.clone(),
    )))
}
