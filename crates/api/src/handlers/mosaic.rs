//! Handler for the `/mosaic` resource.

use axum::extract::State;
use axum::Json;
use tilefarm_core::mosaic::TileSnapshot;

use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/mosaic
///
/// Latest snapshot of every cell in raster order.
pub async fn list_snapshots(State(state): State<AppState>) -> Json<DataResponse<Vec<TileSnapshot>>> {
    let tiles = state.snapshots.read().await.list();
    Json(DataResponse { data: tiles })
}
