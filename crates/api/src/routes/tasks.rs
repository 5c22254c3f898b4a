//! Route definitions for the `/tasks` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// POST   /                    -> create_task
/// GET    /{id}                -> get_task
/// GET    /{id}/jobs           -> list_jobs
/// GET    /{id}/jobs/next      -> next_job
/// POST   /{id}/jobs/claim     -> claim_next
/// GET    /{id}/progress       -> progress
/// GET    /{id}/image          -> image
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(tasks::create_task))
        .route("/{id}", get(tasks::get_task))
        .route("/{id}/jobs", get(tasks::list_jobs))
        .route("/{id}/jobs/next", get(tasks::next_job))
        .route("/{id}/jobs/claim", post(tasks::claim_next))
        .route("/{id}/progress", get(tasks::progress))
        .route("/{id}/image", get(tasks::image))
}
