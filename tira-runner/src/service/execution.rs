//! Execution service
//!
//! Runs one job in the container sandbox:
//! - Stages the dataset, ground truth and previous-stage outputs by copy
//! - Mounts them together with requested Hugging Face models
//! - Runs the container and captures its output
//! - Writes diagnostics and processes profiling data
//!
//! Evaluations with a trusted evaluator configuration are computed in-process
//! instead of in a container.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tira_core::domain::descriptor::{JobDescriptor, JobPaths};
use tira_core::domain::evaluator::EvaluatorConfig;
use tira_core::domain::run::RunKey;
use tira_eval::Measures;
use tracing::{info, warn};

use crate::config::Config;
use crate::container::{
    ContainerInvocation, ContainerRuntime, INPUT_MOUNT, INPUT_RUN_MOUNT, OUTPUT_MOUNT,
    TRUTH_MOUNT, Volume,
};
use crate::diagnostics::{Diagnostics, write_diagnostics};
use crate::hf_cache::HfCache;
use crate::profiling::process_profiling;
use crate::service::evaluation::evaluate_trusted;
use crate::staging::StagedInputs;

/// A job handed to the runner
#[derive(Debug, Clone)]
pub struct Job {
    pub descriptor: JobDescriptor,

    /// Evaluator configuration of a trusted evaluator, evaluated in-process
    pub trusted_evaluator: Option<EvaluatorConfig>,
}

impl Job {
    pub fn new(descriptor: JobDescriptor) -> Self {
        Self {
            descriptor,
            trusted_evaluator: None,
        }
    }
}

/// Result of a finished job
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub run: RunKey,
    pub exit_code: i32,
    pub message: String,

    /// Measures of an in-process evaluation
    pub measures: Option<Measures>,
}

impl JobOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Service trait for executing jobs
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Executes a job to completion
    ///
    /// A failing job is an `Ok` outcome with a non-zero exit code; errors are
    /// reserved for jobs that could not be started at all.
    async fn execute(&self, job: Job) -> Result<JobOutcome>;
}

/// Container sandbox implementation of ExecutionService
pub struct SandboxExecutionService {
    config: Config,
    runtime: ContainerRuntime,
    hf_cache: Arc<Mutex<HfCache>>,
}

impl SandboxExecutionService {
    pub fn new(config: Config) -> Self {
        Self {
            runtime: ContainerRuntime::new(&config.container_runtime),
            hf_cache: Arc::new(Mutex::new(HfCache::new(&config.hf_home))),
            config,
        }
    }

    fn host_paths(&self, descriptor: &JobDescriptor) -> (PathBuf, Option<PathBuf>, Vec<PathBuf>) {
        let dataset = self.config.data_dir.join(descriptor.input_dataset_path());
        let truth = descriptor
            .is_evaluation()
            .then(|| self.config.data_dir.join(descriptor.truth_path()));
        let input_runs = descriptor
            .input_runs
            .iter()
            .map(|run| self.config.run_output_dir(run))
            .collect();
        (dataset, truth, input_runs)
    }

    /// Runs the container of a job, blocking
    fn run_in_sandbox(&self, descriptor: &JobDescriptor) -> Result<JobOutcome> {
        let (dataset, truth, input_runs) = self.host_paths(descriptor);
        let staged = StagedInputs::stage(&self.config.scratch_dir, &dataset, truth.as_deref(), &input_runs)
            .with_context(|| format!("Failed to stage the inputs of {}", descriptor.run_key()))?;

        let result = self.run_staged(descriptor, &staged);

        if let Err(e) = staged.cleanup() {
            warn!("Failed to clean up the inputs of {}: {:#}", descriptor.run_key(), e);
        }
        result
    }

    fn run_staged(&self, descriptor: &JobDescriptor, staged: &StagedInputs) -> Result<JobOutcome> {
        let output_dir = descriptor.task_output_dir();
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let paths = JobPaths {
            input_dataset: INPUT_MOUNT.to_string(),
            ground_truth: TRUTH_MOUNT.to_string(),
            output: OUTPUT_MOUNT.to_string(),
            eval_output: OUTPUT_MOUNT.to_string(),
            input_run: staged.input_run.as_ref().map(|_| INPUT_RUN_MOUNT.to_string()),
        };
        let command = descriptor.resolved_command(&paths);
        let bindings = descriptor.bindings(&paths);

        let mut invocation = ContainerInvocation::new(descriptor.resolved_image(), &command);
        invocation.resources = descriptor.resources.clone();
        invocation.allow_network = descriptor.allow_network;

        invocation.mount(Volume::read_only(&staged.input_dataset, INPUT_MOUNT))?;
        invocation.mount(Volume::read_write(&output_dir, OUTPUT_MOUNT))?;
        if let Some(input_run) = &staged.input_run {
            invocation.mount(Volume::read_only(input_run, INPUT_RUN_MOUNT))?;
        }
        if let Some(truth) = &staged.ground_truth {
            invocation.mount(Volume::read_only(truth, TRUTH_MOUNT))?;
        }
        {
            let mut hf_cache = self
                .hf_cache
                .lock()
                .map_err(|_| anyhow::anyhow!("Hugging Face cache lock poisoned"))?;
            for model in &descriptor.hf_models {
                // Models downloaded since the last scan only show up after a rescan
                let volume = match hf_cache.mount(model) {
                    Ok(volume) => volume,
                    Err(_) => {
                        hf_cache.invalidate();
                        hf_cache.mount(model)?
                    }
                };
                invocation.mount(volume)?;
            }
        }

        invocation.env("outputDir", &bindings.output_dir);
        invocation.env("inputDataset", &bindings.input_dataset);
        if let Some(input_run) = &bindings.input_run {
            invocation.env("inputRun", input_run);
        }
        invocation.env("TIRA_DATASET_ID", &descriptor.dataset_id);
        invocation.env("TIRA_OUTPUT_DIR", &bindings.output_dir);
        invocation.env("TIRA_INPUT_DATASET", &bindings.input_dataset);

        let output = self.runtime.run(&invocation)?;

        write_diagnostics(
            &descriptor.output_dir,
            descriptor,
            &Diagnostics {
                command,
                stdout: output.stdout.clone(),
                stderr: output.stderr.clone(),
            },
        )?;
        process_profiling(&descriptor.output_dir)?;

        let message = if output.success() {
            "software exited successfully".to_string()
        } else {
            format!("software exited with code {}", output.exit_code)
        };
        Ok(JobOutcome {
            run: descriptor.run_key(),
            exit_code: output.exit_code,
            message,
            measures: None,
        })
    }

    /// Evaluates in-process with a trusted evaluator, blocking
    fn run_trusted(&self, descriptor: &JobDescriptor, config: &EvaluatorConfig) -> Result<JobOutcome> {
        let evaluated = descriptor
            .evaluated_run()
            .ok_or_else(|| anyhow::anyhow!("{} evaluates no run", descriptor.run_key()))?;
        let (_, truth, _) = self.host_paths(descriptor);
        let truth = truth.ok_or_else(|| anyhow::anyhow!("{} has no ground truth", descriptor.run_key()))?;
        let run_dir = self.config.run_output_dir(evaluated);
        let output_dir = descriptor.task_output_dir();

        let report = evaluate_trusted(&run_dir, &truth, config, &output_dir)?;

        write_diagnostics(
            &descriptor.output_dir,
            descriptor,
            &Diagnostics {
                command: report.command.clone(),
                stdout: report.stdout.clone(),
                stderr: report.stderr.clone(),
            },
        )?;

        let (exit_code, message) = match &report.measures {
            Some(measures) => (0, format!("computed {} measure(s)", measures.len())),
            None => (1, report.stderr.trim().to_string()),
        };
        Ok(JobOutcome {
            run: descriptor.run_key(),
            exit_code,
            message,
            measures: report.measures,
        })
    }
}

#[async_trait]
impl ExecutionService for SandboxExecutionService {
    async fn execute(&self, job: Job) -> Result<JobOutcome> {
        job.descriptor
            .validate()
            .with_context(|| format!("Invalid descriptor for {}", job.descriptor.run_key()))?;
        info!(
            "Executing {} ({})",
            job.descriptor.run_key(),
            if job.descriptor.is_evaluation() { "evaluation" } else { "execution" }
        );

        let service = Self {
            config: self.config.clone(),
            runtime: self.runtime.clone(),
            hf_cache: Arc::clone(&self.hf_cache),
        };
        tokio::task::spawn_blocking(move || match (&job.trusted_evaluator, job.descriptor.is_evaluation()) {
            (Some(config), true) => service.run_trusted(&job.descriptor, config),
            _ => service.run_in_sandbox(&job.descriptor),
        })
        .await
        .context("Job task panicked")?
    }
}
