//! Latest submitted image per mosaic grid cell.
//!
//! Submissions are last-write-wins: a new snapshot for a cell replaces the
//! previous one unconditionally, with no ordering guarantee against
//! out-of-order delivery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::lease::tile_id as cell_id;
use crate::types::Timestamp;

/// Maximum accepted size of an encoded snapshot payload (bytes).
pub const MAX_SNAPSHOT_PAYLOAD_LEN: usize = 8 * 1024 * 1024;

/// Body of a snapshot submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitSnapshot {
    pub tile_id: Option<String>,
    pub tile_x: Option<u32>,
    pub tile_y: Option<u32>,
    pub tiles_x: Option<u32>,
    pub tiles_y: Option<u32>,
    /// Encoded image, typically a `data:image/...;base64,` URL.
    pub image_data_url: Option<String>,
}

/// The most recent image a client submitted for one grid cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileSnapshot {
    pub tile_id: String,
    pub tile_x: u32,
    pub tile_y: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub updated_at: Timestamp,
    pub image_data_url: String,
}

impl SubmitSnapshot {
    /// Validate the submission and stamp it with `now`.
    pub fn into_snapshot(self, now: Timestamp) -> Result<TileSnapshot, CoreError> {
        let missing = || CoreError::Validation("Missing tile payload".to_string());

        let tile_id = self.tile_id.filter(|id| !id.is_empty()).ok_or_else(missing)?;
        let tile_x = self.tile_x.ok_or_else(missing)?;
        let tile_y = self.tile_y.ok_or_else(missing)?;
        let tiles_x = self.tiles_x.ok_or_else(missing)?;
        let tiles_y = self.tiles_y.ok_or_else(missing)?;
        let image_data_url = self
            .image_data_url
            .filter(|data| !data.is_empty())
            .ok_or_else(missing)?;

        if tile_id != cell_id(tile_x, tile_y) {
            return Err(CoreError::Validation(format!(
                "Tile id '{tile_id}' does not name cell ({tile_x}, {tile_y})"
            )));
        }
        if tile_x >= tiles_x || tile_y >= tiles_y {
            return Err(CoreError::Validation(format!(
                "Cell ({tile_x}, {tile_y}) lies outside a {tiles_x}x{tiles_y} grid"
            )));
        }
        if image_data_url.len() > MAX_SNAPSHOT_PAYLOAD_LEN {
            return Err(CoreError::Validation(format!(
                "Snapshot payload exceeds {MAX_SNAPSHOT_PAYLOAD_LEN} bytes"
            )));
        }

        Ok(TileSnapshot {
            tile_id,
            tile_x,
            tile_y,
            tiles_x,
            tiles_y,
            updated_at: now,
            image_data_url,
        })
    }
}

/// Process-lifetime snapshot table keyed by tile id.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    tiles: HashMap<String, TileSnapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot, replacing any earlier one for the same cell.
    pub fn update(&mut self, snapshot: TileSnapshot) {
        self.tiles.insert(snapshot.tile_id.clone(), snapshot);
    }

    /// All snapshots in raster order of their cells.
    pub fn list(&self) -> Vec<TileSnapshot> {
        let mut tiles: Vec<_> = self.tiles.values().cloned().collect();
        tiles.sort_by(|a, b| (a.tile_y, a.tile_x, &a.tile_id).cmp(&(b.tile_y, b.tile_x, &b.tile_id)));
        tiles
    }
}
