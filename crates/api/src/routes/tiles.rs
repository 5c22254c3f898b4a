//! Route definitions for the `/tiles` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tiles;
use crate::state::AppState;

/// Routes mounted at `/tiles`.
///
/// ```text
/// GET    /                    -> list_leases
/// POST   /                    -> assign_tile
/// POST   /heartbeat           -> heartbeat
/// POST   /release             -> release
/// POST   /submit              -> submit_snapshot
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(tiles::list_leases).post(tiles::assign_tile))
        .route("/heartbeat", post(tiles::heartbeat))
        .route("/release", post(tiles::release))
        .route("/submit", post(tiles::submit_snapshot))
}
