//! Confirmation Protocol API Handlers
//!
//! HTTP endpoints the execution backends call to report progress. Application
//! failures are answered with a `FAILED` envelope, not an HTTP error.

use axum::{
    Json,
    extract::{Path, State},
};
use tira_core::domain::transaction::{Transaction, TransactionRecord};
use tira_core::domain::vm::VmTransition;
use tira_core::dto::transaction::{
    CompleteTransactionRequest, ConfirmEvaluationRequest, ConfirmExecutionRequest, SetStateRequest,
};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::transaction_service;

// =============================================================================
// Confirmation Endpoints
// =============================================================================

/// POST /v1/set_state
pub async fn set_state(
    State(state): State<AppState>,
    Json(req): Json<SetStateRequest>,
) -> ApiResult<Json<Transaction>> {
    let answer = transaction_service::set_state(state.store.as_ref(), req).await?;
    Ok(Json(answer))
}

/// POST /v1/confirm_execution
pub async fn confirm_execution(
    State(state): State<AppState>,
    Json(req): Json<ConfirmExecutionRequest>,
) -> ApiResult<Json<Transaction>> {
    let answer = transaction_service::confirm_execution(state.store.as_ref(), req).await?;
    Ok(Json(answer))
}

/// POST /v1/confirm_evaluation
pub async fn confirm_evaluation(
    State(state): State<AppState>,
    Json(req): Json<ConfirmEvaluationRequest>,
) -> ApiResult<Json<Transaction>> {
    let answer = transaction_service::confirm_evaluation(state.store.as_ref(), req).await?;
    Ok(Json(answer))
}

/// POST /v1/complete_transaction
/// Final step of every exchange, marks the transaction as completed
pub async fn complete_transaction(
    State(state): State<AppState>,
    Json(req): Json<CompleteTransactionRequest>,
) -> ApiResult<Json<Transaction>> {
    let answer = transaction_service::complete_transaction(state.store.as_ref(), req).await?;
    Ok(Json(answer))
}

// =============================================================================
// Query Endpoints
// =============================================================================

/// GET /v1/transaction/{id}
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TransactionRecord>> {
    tracing::debug!("Getting transaction: {}", id);

    let record = transaction_service::get_transaction(state.store.as_ref(), &id).await?;
    Ok(Json(record))
}

/// GET /v1/vm/{vm_id}/state
pub async fn get_vm_state(
    State(state): State<AppState>,
    Path(vm_id): Path<String>,
) -> ApiResult<Json<VmTransition>> {
    tracing::debug!("Getting state of vm: {}", vm_id);

    let transition = transaction_service::get_vm_state(state.store.as_ref(), &vm_id).await?;
    Ok(Json(transition))
}
