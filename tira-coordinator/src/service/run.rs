//! Run Service
//!
//! Creates runs with collision-free identifiers and tracks their lifecycle.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tira_core::domain::run::{Run, RunKey, RunLifecycle, run_id_candidates};
use tira_core::dto::run::CreateRun;

use crate::repository::{LedgerStore, StoreError};

/// Upper bound of candidate ids tried for one creation, one hour of seconds
const MAX_RUN_ID_ATTEMPTS: usize = 3600;

/// Service error type
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Run {0} not found")]
    NotFound(RunKey),

    #[error("Invalid run: {0}")]
    ValidationError(String),

    #[error("No free run id for {dataset_id}/{vm_id} after {attempts} attempts")]
    IdsExhausted {
        dataset_id: String,
        vm_id: String,
        attempts: usize,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create a run, deriving its id from the current time
///
/// An evaluation run also records a pending evaluation of the run it
/// evaluates.
pub async fn create_run(store: &dyn LedgerStore, req: CreateRun) -> Result<Run, RunError> {
    create_run_at(store, req, Utc::now()).await
}

/// Create a run whose id is derived from `now`
///
/// If the id is taken for the (dataset, vm) pair the next second is tried.
/// The store inserts conditionally, so concurrent creators never share an id.
pub async fn create_run_at(
    store: &dyn LedgerStore,
    req: CreateRun,
    now: DateTime<Utc>,
) -> Result<Run, RunError> {
    validate_create_run(&req)?;

    for run_id in run_id_candidates(now).take(MAX_RUN_ID_ATTEMPTS) {
        let run = Run {
            key: RunKey::new(&req.dataset_id, &req.vm_id, run_id),
            software_id: req.software_id.clone(),
            input_run_id: req.input_run_id.clone(),
            is_evaluation: req.is_evaluation,
            downloadable: false,
            deleted: false,
            lifecycle: RunLifecycle::Created,
            created_at: now,
        };

        if !store.insert_run(&run).await? {
            tracing::debug!("Run id {} taken, trying the next one", run.key);
            continue;
        }

        if let (true, Some(evaluated)) = (run.is_evaluation, &run.input_run_id) {
            store.add_pending_evaluation(&run.key.vm_id, evaluated).await?;
        }

        tracing::info!("Run created: {}", run.key);
        return Ok(run);
    }

    Err(RunError::IdsExhausted {
        dataset_id: req.dataset_id,
        vm_id: req.vm_id,
        attempts: MAX_RUN_ID_ATTEMPTS,
    })
}

/// Get a run by key
pub async fn get_run(store: &dyn LedgerStore, key: &RunKey) -> Result<Run, RunError> {
    store
        .find_run(key)
        .await?
        .ok_or_else(|| RunError::NotFound(key.clone()))
}

/// Move a run forward in its lifecycle
pub async fn advance(store: &dyn LedgerStore, key: &RunKey, to: RunLifecycle) -> Result<Run, RunError> {
    store
        .advance_run(key, to)
        .await?
        .ok_or_else(|| RunError::NotFound(key.clone()))
}

fn validate_create_run(req: &CreateRun) -> Result<(), RunError> {
    if req.dataset_id.trim().is_empty() {
        return Err(RunError::ValidationError("dataset_id cannot be empty".to_string()));
    }

    if req.vm_id.trim().is_empty() {
        return Err(RunError::ValidationError("vm_id cannot be empty".to_string()));
    }

    if req.is_evaluation && req.input_run_id.is_none() {
        return Err(RunError::ValidationError(
            "an evaluation run needs the input_run_id of the evaluated run".to_string(),
        ));
    }

    Ok(())
}
