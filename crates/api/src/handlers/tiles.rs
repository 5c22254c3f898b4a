//! Handlers for the `/tiles` resource (mosaic grid leases).
//!
//! The lease table lives in this process only; see
//! [`tilefarm_core::lease`].

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tilefarm_core::error::CoreError;
use tilefarm_core::lease::{GridShape, TileLease};
use tilefarm_core::mosaic::SubmitSnapshot;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of an assignment request.
#[derive(Debug, Deserialize)]
pub struct AssignTileRequest {
    pub client_id: Option<String>,
    /// New grid shape; both dimensions must be given together.
    pub tiles_x: Option<u32>,
    pub tiles_y: Option<u32>,
}

/// Body of heartbeat and release requests.
#[derive(Debug, Deserialize)]
pub struct LeaseRequest {
    pub tile_id: Option<String>,
    pub client_id: Option<String>,
}

/// Current grid shape plus every live lease.
#[derive(Debug, Serialize)]
pub struct LeaseTable {
    pub grid: GridShape,
    pub leases: Vec<TileLease>,
}

#[derive(Debug, Serialize)]
pub struct Released {
    pub released: bool,
}

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub ok: bool,
}

fn required(value: Option<String>, name: &str) -> AppResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CoreError::Validation(format!("{name} is required")).into())
}

/// Validate an optional grid reshape carried by an assignment request.
fn requested_grid(input: &AssignTileRequest) -> AppResult<Option<GridShape>> {
    match (input.tiles_x, input.tiles_y) {
        (None, None) => Ok(None),
        (Some(x), Some(y)) if x >= 1 && y >= 1 => Ok(Some(GridShape::new(x, y))),
        (Some(_), Some(_)) => Err(CoreError::Validation(
            "tiles_x and tiles_y must be at least 1".to_string(),
        )
        .into()),
        _ => Err(CoreError::Validation(
            "tiles_x and tiles_y must be given together".to_string(),
        )
        .into()),
    }
}

// ---------------------------------------------------------------------------
// Leases
// ---------------------------------------------------------------------------

/// GET /api/v1/tiles
pub async fn list_leases(State(state): State<AppState>) -> Json<DataResponse<LeaseTable>> {
    let coordinator = state.coordinator.lock().await;
    Json(DataResponse {
        data: LeaseTable {
            grid: coordinator.grid(),
            leases: coordinator.leases(),
        },
    })
}

/// POST /api/v1/tiles
///
/// Lease a grid cell to the client, reshaping the grid first when
/// `tiles_x`/`tiles_y` are given. Evicts the least-recently-seen holder
/// when the grid is full.
pub async fn assign_tile(
    State(state): State<AppState>,
    Json(input): Json<AssignTileRequest>,
) -> AppResult<Json<DataResponse<TileLease>>> {
    let grid = requested_grid(&input)?;
    let client_id = required(input.client_id, "client_id")?;

    let mut coordinator = state.coordinator.lock().await;
    if let Some(grid) = grid {
        coordinator.configure_grid(grid.tiles_x, grid.tiles_y);
    }
    let lease = coordinator.assign_tile(&client_id, Utc::now())?;
    drop(coordinator);

    tracing::info!(tile_id = %lease.tile_id, client_id = %client_id, "Tile assigned");
    Ok(Json(DataResponse { data: lease }))
}

/// POST /api/v1/tiles/heartbeat
///
/// Refresh a lease. 404 when the lease is gone or held by someone else.
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(input): Json<LeaseRequest>,
) -> AppResult<Json<DataResponse<TileLease>>> {
    let tile_id = required(input.tile_id, "tile_id")?;
    let client_id = required(input.client_id, "client_id")?;

    let lease = state
        .coordinator
        .lock()
        .await
        .heartbeat(&tile_id, &client_id, Utc::now())
        .ok_or_else(|| CoreError::not_found("Lease", &tile_id))?;
    Ok(Json(DataResponse { data: lease }))
}

/// POST /api/v1/tiles/release
pub async fn release(
    State(state): State<AppState>,
    Json(input): Json<LeaseRequest>,
) -> AppResult<Json<DataResponse<Released>>> {
    let tile_id = required(input.tile_id, "tile_id")?;
    let client_id = required(input.client_id, "client_id")?;

    let released = state.coordinator.lock().await.release(&tile_id, &client_id);
    if released {
        tracing::info!(tile_id = %tile_id, client_id = %client_id, "Tile released");
    }
    Ok(Json(DataResponse {
        data: Released { released },
    }))
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// POST /api/v1/tiles/submit
///
/// Store the latest image for a grid cell, replacing any earlier one.
pub async fn submit_snapshot(
    State(state): State<AppState>,
    Json(input): Json<SubmitSnapshot>,
) -> AppResult<Json<DataResponse<Accepted>>> {
    let snapshot = input.into_snapshot(Utc::now())?;
    tracing::debug!(tile_id = %snapshot.tile_id, bytes = snapshot.image_data_url.len(), "Snapshot received");
    state.snapshots.write().await.update(snapshot);
    Ok(Json(DataResponse {
        data: Accepted { ok: true },
    }))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::error::AppError;

    fn assign(tiles_x: Option<u32>, tiles_y: Option<u32>) -> AssignTileRequest {
        AssignTileRequest {
            client_id: Some("c".into()),
            tiles_x,
            tiles_y,
        }
    }

    #[test]
    fn grid_reshape_needs_both_dimensions() {
        assert_matches!(requested_grid(&assign(None, None)), Ok(None));
        assert_matches!(
            requested_grid(&assign(Some(3), Some(2))),
            Ok(Some(GridShape { tiles_x: 3, tiles_y: 2 }))
        );
        assert_matches!(
            requested_grid(&assign(Some(3), None)),
            Err(AppError::Core(CoreError::Validation(_)))
        );
        assert_matches!(
            requested_grid(&assign(Some(0), Some(2))),
            Err(AppError::Core(CoreError::Validation(_)))
        );
    }
}
