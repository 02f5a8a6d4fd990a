//! API Module
//!
//! HTTP API layer for the coordinator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod run;
pub mod transaction;

use axum::{
    Router,
    routing::{get, post},
};
use std::path::PathBuf;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::repository::LedgerStore;

/// Shared state of all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,

    /// Root of the run directories, `<runs_dir>/<dataset>/<vm>/<run>`
    pub runs_dir: PathBuf,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState, max_concurrent_requests: usize) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Confirmation protocol
        .route("/v1/set_state", post(transaction::set_state))
        .route("/v1/confirm_execution", post(transaction::confirm_execution))
        .route("/v1/confirm_evaluation", post(transaction::confirm_evaluation))
        .route("/v1/complete_transaction", post(transaction::complete_transaction))
        .route("/v1/transaction/{id}", get(transaction::get_transaction))
        .route("/v1/vm/{vm_id}/state", get(transaction::get_vm_state))
        // Run endpoints
        .route("/v1/run", post(run::create_run))
        .route("/v1/run/{dataset_id}/{vm_id}/{run_id}", get(run::get_run))
        .route(
            "/v1/run/{dataset_id}/{vm_id}/{run_id}/review",
            get(run::get_review),
        )
        // Add state and middleware
        .with_state(state)
        .layer(ConcurrencyLimitLayer::new(max_concurrent_requests))
        .layer(TraceLayer::new_for_http())
}
