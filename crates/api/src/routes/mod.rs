pub mod health;
pub mod jobs;
pub mod tasks;
pub mod tiles;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /tasks                                           create
/// /tasks/{id}                                      get
/// /tasks/{id}/jobs                                 list jobs (raster order)
/// /tasks/{id}/jobs/next                            next job, no claim (GET)
/// /tasks/{id}/jobs/claim                           select and claim (POST)
/// /tasks/{id}/progress                             per-status counts
/// /tasks/{id}/image                                PNG preview
///
/// /jobs/{id}                                       get
/// /jobs/{id}/start                                 start (POST)
/// /jobs/{id}/complete                              complete (POST)
///
/// /tiles                                           list leases, assign
/// /tiles/heartbeat                                 refresh lease (POST)
/// /tiles/release                                   release lease (POST)
/// /tiles/submit                                    submit snapshot (POST)
///
/// /mosaic                                          latest snapshots
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/tasks", tasks::router())
        .nest("/jobs", jobs::router())
        .nest("/tiles", tiles::router())
        .route("/mosaic", get(handlers::mosaic::list_snapshots))
}
