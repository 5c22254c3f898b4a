//! Handlers for the `/jobs` resource.

use axum::extract::{Path, State};
use axum::Json;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::Deserialize;
use tilefarm_core::error::CoreError;
use tilefarm_core::types::DbId;
use tilefarm_db::models::job::Job;

use crate::engine::dispatcher::UNKNOWN_WORKER_ID;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of start and claim requests.
#[derive(Debug, Default, Deserialize)]
pub struct WorkerRequest {
    pub worker_id: Option<String>,
}

impl WorkerRequest {
    /// The named worker, or [`UNKNOWN_WORKER_ID`] when absent or blank.
    pub fn worker_id(&self) -> &str {
        self.worker_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(UNKNOWN_WORKER_ID)
    }
}

/// Body of a completion request.
#[derive(Debug, Deserialize)]
pub struct CompleteJobRequest {
    /// Raw tile pixels, base64 encoded.
    pub result_data: Option<String>,
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Job>>> {
    let job = state.dispatcher.get_job(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/start
///
/// Mark the job started by the calling worker. Returns 404 for an unknown
/// job, and 409 when strict claiming is on and the job is taken.
pub async fn start_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(input): Json<WorkerRequest>,
) -> AppResult<Json<DataResponse<Job>>> {
    let job = state.dispatcher.start_job(job_id, input.worker_id()).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/complete
///
/// Store the rendered tile and mark the job completed. Re-submitting
/// replaces the stored result.
pub async fn complete_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(input): Json<CompleteJobRequest>,
) -> AppResult<Json<DataResponse<Job>>> {
    let encoded = input
        .result_data
        .filter(|data| !data.is_empty())
        .ok_or_else(|| CoreError::Validation("result_data is required".to_string()))?;
    let pixels = BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| CoreError::Validation(format!("result_data is not valid base64: {e}")))?;

    let job = state.dispatcher.complete_job(job_id, &pixels).await?;
    Ok(Json(DataResponse { data: job }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_worker_defaults() {
        assert_eq!(WorkerRequest::default().worker_id(), "unknown-worker");
        let blank = WorkerRequest { worker_id: Some("  ".into()) };
        assert_eq!(blank.worker_id(), "unknown-worker");
        let named = WorkerRequest { worker_id: Some("gpu-7".into()) };
        assert_eq!(named.worker_id(), "gpu-7");
    }
}
