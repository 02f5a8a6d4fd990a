//! Resource-class worker pool
//!
//! Jobs are queued by resource class. Each class is a semaphore sized from the
//! host counts; a job holds its permit until it is confirmed.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tira_core::domain::descriptor::JobDescriptor;
use tira_core::domain::vm::VmState;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::repository::CoordinatorRepository;
use crate::service::{ExecutionService, Job, JobOutcome};

/// Queue a job waits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Gpu,
    General,
}

impl ResourceClass {
    /// Evaluations always run on general workers
    pub fn of(descriptor: &JobDescriptor) -> Self {
        if !descriptor.is_evaluation() && descriptor.resources.gpu.is_requested() {
            ResourceClass::Gpu
        } else {
            ResourceClass::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Gpu => "gpu",
            ResourceClass::General => "general",
        }
    }
}

pub struct WorkerPool {
    gpu: Arc<Semaphore>,
    general: Arc<Semaphore>,
    gpu_workers: usize,
    executor: Arc<dyn ExecutionService>,
    coordinator: Arc<dyn CoordinatorRepository>,
}

impl WorkerPool {
    /// Creates a pool sized by `config.gpu_workers` and `config.general_workers`
    pub fn new(
        config: &Config,
        executor: Arc<dyn ExecutionService>,
        coordinator: Arc<dyn CoordinatorRepository>,
    ) -> Self {
        Self {
            gpu: Arc::new(Semaphore::new(config.gpu_workers)),
            general: Arc::new(Semaphore::new(config.general_workers)),
            gpu_workers: config.gpu_workers,
            executor,
            coordinator,
        }
    }

    /// Runs one job to its confirmation
    ///
    /// Waits for a worker of the job's resource class. The VM moves through
    /// sandboxing, executing and unsandboxing, and is reported running again
    /// once the outcome is confirmed.
    pub async fn run_job(&self, job: Job) -> Result<JobOutcome> {
        let class = ResourceClass::of(&job.descriptor);
        let semaphore = match class {
            ResourceClass::Gpu if self.gpu_workers == 0 => {
                anyhow::bail!(
                    "{} requests a GPU but this host has no GPU workers",
                    job.descriptor.run_key()
                );
            }
            ResourceClass::Gpu => &self.gpu,
            ResourceClass::General => &self.general,
        };

        let _permit = Arc::clone(semaphore)
            .acquire_owned()
            .await
            .context("Worker pool closed")?;

        let descriptor = job.descriptor.clone();
        let vm_id = descriptor.vm_id.as_str();
        info!("Running {} on a {} worker", descriptor.run_key(), class.as_str());

        self.report(vm_id, VmState::Sandboxing).await;
        self.report(vm_id, VmState::Executing).await;
        let result = self.executor.execute(job).await;
        self.report(vm_id, VmState::Unsandboxing).await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Job {} could not be run: {:#}", descriptor.run_key(), e);
                self.confirm(&descriptor, false, &format!("{:#}", e), None).await?;
                self.report(vm_id, VmState::Running).await;
                return Err(e);
            }
        };

        self.confirm(
            &descriptor,
            outcome.success(),
            &outcome.message,
            outcome.measures.clone(),
        )
        .await?;
        self.report(vm_id, VmState::Running).await;

        Ok(outcome)
    }

    /// Runs all jobs concurrently, results in job order
    pub async fn run_all(self: &Arc<Self>, jobs: Vec<Job>) -> Vec<Result<JobOutcome>> {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let pool = Arc::clone(self);
                tokio::spawn(async move { pool.run_job(job).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("Job task panicked: {}", e)),
            });
        }
        results
    }

    async fn report(&self, vm_id: &str, state: VmState) {
        if let Err(e) = self.coordinator.report_state(vm_id, state).await {
            warn!("Failed to report {} as {}: {:#}", vm_id, state.as_str(), e);
        }
    }

    /// Evaluations are confirmed for the run they evaluate
    async fn confirm(
        &self,
        descriptor: &JobDescriptor,
        success: bool,
        message: &str,
        measures: Option<tira_eval::Measures>,
    ) -> Result<()> {
        match descriptor.evaluated_run() {
            Some(evaluated) => {
                self.coordinator
                    .confirm_evaluation(evaluated, success, message, measures)
                    .await
            }
            None => {
                self.coordinator
                    .confirm_execution(&descriptor.run_key(), success, message)
                    .await
            }
        }
    }
}
