//! Handlers for the `/tasks` resource.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use tilefarm_core::task::CreateTaskRequest;
use tilefarm_core::types::DbId;

use crate::error::AppResult;
use crate::handlers::data_or_no_content;
use crate::handlers::jobs::WorkerRequest;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Create / read
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks
///
/// Create a task and all of its tile jobs. Returns 201 with
/// `{ task_id, job_count }`.
pub async fn create_task(
    State(state): State<AppState>,
    Json(input): Json<CreateTaskRequest>,
) -> AppResult<impl IntoResponse> {
    let created = state.decomposer.create_task(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = state.dispatcher.get_task(task_id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// GET /api/v1/tasks/{id}/jobs
///
/// Every job of the task in raster order, completed payloads as base64.
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.dispatcher.list_jobs(task_id).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/tasks/{id}/progress
pub async fn progress(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let progress = state.dispatcher.progress(task_id).await?;
    Ok(Json(DataResponse { data: progress }))
}

/// GET /api/v1/tasks/{id}/image
///
/// PNG preview assembled from the completed tiles.
pub async fn image(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let png = state.aggregator.task_png(task_id).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// GET /api/v1/tasks/{id}/jobs/next
///
/// Lowest raster-ordered claimable job with its task parameters, or 204
/// when nothing is claimable right now. Does not claim the job.
pub async fn next_job(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let next = state.dispatcher.next_job(task_id).await?;
    Ok(data_or_no_content(next))
}

/// POST /api/v1/tasks/{id}/jobs/claim
///
/// Select and claim the next job in one step. 204 when nothing is
/// claimable.
pub async fn claim_next(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
    Json(input): Json<WorkerRequest>,
) -> AppResult<impl IntoResponse> {
    let claimed = state
        .dispatcher
        .claim_next(task_id, input.worker_id())
        .await?;
    Ok(data_or_no_content(claimed))
}
