//! Run API Handlers
//!
//! HTTP endpoints for run creation, lifecycle lookup and reviews.

use axum::{
    Json,
    extract::{Path, State},
};
use tira_core::domain::review::Review;
use tira_core::domain::run::{Run, RunKey};
use tira_core::dto::run::CreateRun;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::{review_service, run_service};

/// POST /v1/run
/// Create a run with a freshly generated run id
pub async fn create_run(
    State(state): State<AppState>,
    Json(req): Json<CreateRun>,
) -> ApiResult<Json<Run>> {
    tracing::info!("Creating run for {}/{}", req.dataset_id, req.vm_id);

    let run = run_service::create_run(state.store.as_ref(), req).await?;
    Ok(Json(run))
}

/// GET /v1/run/{dataset_id}/{vm_id}/{run_id}
pub async fn get_run(
    State(state): State<AppState>,
    Path((dataset_id, vm_id, run_id)): Path<(String, String, String)>,
) -> ApiResult<Json<Run>> {
    let key = RunKey::new(dataset_id, vm_id, run_id);
    tracing::debug!("Getting run: {}", key);

    let run = run_service::get_run(state.store.as_ref(), &key).await?;
    Ok(Json(run))
}

/// GET /v1/run/{dataset_id}/{vm_id}/{run_id}/review
/// Get the review of a run, running the auto-reviewer if none exists
pub async fn get_review(
    State(state): State<AppState>,
    Path((dataset_id, vm_id, run_id)): Path<(String, String, String)>,
) -> ApiResult<Json<Review>> {
    let key = RunKey::new(dataset_id, vm_id, run_id);
    tracing::debug!("Getting review of run: {}", key);

    let review = review_service::review_run(state.store.as_ref(), &state.runs_dir, &key).await?;
    Ok(Json(review))
}
