//! Transaction Service
//!
//! The coordinator side of the confirmation protocol. Every call records the
//! caller's envelope in the ledger and answers with a fresh envelope. The
//! coordinator never retries; failures are reported in the envelope so the
//! caller can retry the same call.

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tira_core::domain::run::{RunKey, RunLifecycle};
use tira_core::domain::transaction::{LedgerStatus, Transaction, TransactionRecord, TransactionUpdate};
use tira_core::domain::vm::VmTransition;
use tira_core::dto::transaction::{ConfirmEvaluationRequest, ConfirmExecutionRequest, SetStateRequest};
use tracing::{debug, info, warn};

use crate::repository::{LedgerStore, StoreError};

pub const SET_STATE: &str = "set_state";
pub const CONFIRM_EXECUTION: &str = "confirm_execution";
pub const CONFIRM_EVALUATION: &str = "confirm_evaluation";
pub const COMPLETE_TRANSACTION: &str = "complete_transaction";

/// Service error type
#[derive(Debug, Error)]
pub enum TransactionError {
    /// A completed transaction would change
    #[error("{0}")]
    Integrity(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transaction {0} not found")]
    NotFound(String),

    #[error("VM {0} has no recorded state")]
    VmNotFound(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TransactionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CompletedTransaction { .. } => TransactionError::Integrity(err.to_string()),
            other => TransactionError::Store(other),
        }
    }
}

// =============================================================================
// Confirmation Protocol
// =============================================================================

/// Records a VM state reported by a backend
pub async fn set_state(store: &dyn LedgerStore, req: SetStateRequest) -> Result<Transaction, TransactionError> {
    check_transaction_id(&req.transaction)?;
    info!(
        "Received vm-state {} for {}, transaction {}",
        req.state, req.vm_id, req.transaction.transaction_id
    );

    let outcome: Result<(), TransactionError> = async {
        store
            .upsert_transaction(open_update(SET_STATE, &req.transaction))
            .await?;
        store
            .record_vm_transition(VmTransition {
                vm_id: req.vm_id.clone(),
                state: req.state,
                last_transaction: req.transaction.transaction_id.clone(),
                updated_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
    .await;

    acknowledge(SET_STATE, &req.transaction, outcome)
}

/// Records that a backend finished executing a run
///
/// The run moves to `executed` whatever the outcome of the execution. The
/// transaction stays open until [`complete_transaction`].
pub async fn confirm_execution(
    store: &dyn LedgerStore,
    req: ConfirmExecutionRequest,
) -> Result<Transaction, TransactionError> {
    check_transaction_id(&req.transaction)?;
    info!(
        "Received execution confirmation for {}, transaction {}",
        req.run, req.transaction.transaction_id
    );

    let outcome: Result<(), TransactionError> = async {
        store
            .upsert_transaction(open_update(CONFIRM_EXECUTION, &req.transaction))
            .await?;
        advance_known_run(store, &req.run, RunLifecycle::Executed).await
    }
    .await;

    acknowledge(CONFIRM_EXECUTION, &req.transaction, outcome)
}

/// Records that an evaluation of a run finished
///
/// Clears the pending evaluation marker of the run. On success the run moves
/// to `evaluated` and the measures are stored.
pub async fn confirm_evaluation(
    store: &dyn LedgerStore,
    req: ConfirmEvaluationRequest,
) -> Result<Transaction, TransactionError> {
    check_transaction_id(&req.transaction)?;
    info!(
        "Received evaluation confirmation for {} with {} measures, transaction {}",
        req.run,
        req.measures.as_ref().map(BTreeMap::len).unwrap_or(0),
        req.transaction.transaction_id
    );

    let outcome: Result<(), TransactionError> = async {
        store
            .upsert_transaction(open_update(CONFIRM_EVALUATION, &req.transaction))
            .await?;

        let was_pending = store
            .remove_pending_evaluation(&req.run.vm_id, &req.run.run_id)
            .await?;
        debug!("Pending evaluation of {} cleared: {}", req.run, was_pending);

        if req.transaction.is_success() {
            advance_known_run(store, &req.run, RunLifecycle::Evaluated).await?;
            if let Some(measures) = &req.measures {
                store_measures(store, &req.run, measures).await?;
            }
        }
        Ok(())
    }
    .await;

    acknowledge(CONFIRM_EVALUATION, &req.transaction, outcome)
}

/// Marks a transaction as completed, the final step of every exchange
///
/// Repeating the same completion succeeds without changing the record.
pub async fn complete_transaction(
    store: &dyn LedgerStore,
    transaction: Transaction,
) -> Result<Transaction, TransactionError> {
    check_transaction_id(&transaction)?;
    info!("Received complete_transaction for {}", transaction.transaction_id);

    let update = TransactionUpdate {
        transaction_id: transaction.transaction_id.clone(),
        status: if transaction.is_success() {
            LedgerStatus::Success
        } else {
            LedgerStatus::Failed
        },
        last_message: format!("{}:{}", COMPLETE_TRANSACTION, transaction.message),
        completed: true,
    };

    let outcome = store
        .upsert_transaction(update)
        .await
        .map(|_| ())
        .map_err(TransactionError::from);

    acknowledge(COMPLETE_TRANSACTION, &transaction, outcome)
}

// =============================================================================
// Queries
// =============================================================================

/// Get a ledger record by transaction id
pub async fn get_transaction(
    store: &dyn LedgerStore,
    transaction_id: &str,
) -> Result<TransactionRecord, TransactionError> {
    store
        .find_transaction(transaction_id)
        .await?
        .ok_or_else(|| TransactionError::NotFound(transaction_id.to_string()))
}

/// Get the last recorded state of a VM
pub async fn get_vm_state(store: &dyn LedgerStore, vm_id: &str) -> Result<VmTransition, TransactionError> {
    store
        .find_vm_transition(vm_id)
        .await?
        .ok_or_else(|| TransactionError::VmNotFound(vm_id.to_string()))
}

// =============================================================================
// Helper Functions
// =============================================================================

fn check_transaction_id(transaction: &Transaction) -> Result<(), TransactionError> {
    if transaction.transaction_id.trim().is_empty() {
        return Err(TransactionError::InvalidRequest(
            "transaction_id cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Ledger update of a call that keeps the transaction open
fn open_update(operation: &str, transaction: &Transaction) -> TransactionUpdate {
    TransactionUpdate {
        transaction_id: transaction.transaction_id.clone(),
        status: if transaction.is_success() {
            LedgerStatus::Pending
        } else {
            LedgerStatus::Failed
        },
        last_message: format!("{}:{}", operation, transaction.message),
        completed: false,
    }
}

async fn advance_known_run(
    store: &dyn LedgerStore,
    run: &RunKey,
    to: RunLifecycle,
) -> Result<(), TransactionError> {
    if store.advance_run(run, to).await?.is_none() {
        warn!("Confirmation for unknown run {}, lifecycle not tracked", run);
    }
    Ok(())
}

async fn store_measures(
    store: &dyn LedgerStore,
    run: &RunKey,
    measures: &BTreeMap<String, Value>,
) -> Result<(), TransactionError> {
    store.store_measures(run, measures).await?;
    Ok(())
}

/// Turns the outcome of a call into the answer envelope
///
/// Integrity and request errors are returned as errors, everything else is
/// reported as a `FAILED` envelope the caller retries.
fn acknowledge(
    operation: &str,
    transaction: &Transaction,
    outcome: Result<(), TransactionError>,
) -> Result<Transaction, TransactionError> {
    let transaction_id = transaction.transaction_id.clone();
    match outcome {
        Ok(()) => Ok(Transaction::success(
            transaction_id,
            format!("{}:SUCCESS", operation),
        )),
        Err(err @ (TransactionError::Integrity(_) | TransactionError::InvalidRequest(_))) => {
            warn!("{} rejected for {}: {}", operation, transaction_id, err);
            Err(err)
        }
        Err(err) => {
            warn!("{} failed for {}: {}", operation, transaction_id, err);
            Ok(Transaction::failed(
                transaction_id,
                format!("{}:FAILED with {}", operation, err),
            ))
        }
    }
}
