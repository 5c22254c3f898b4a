//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /{id}                -> get_job
/// POST   /{id}/start          -> start_job
/// POST   /{id}/complete       -> complete_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/start", post(jobs::start_job))
        .route("/{id}/complete", post(jobs::complete_job))
}
