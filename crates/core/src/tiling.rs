//! Tile grid generation.
//!
//! Splits an image rectangle into fixed-size, axis-aligned tiles in raster
//! order. Tiles on the right and bottom edges are clipped to the remaining
//! extent rather than padded, so the tiles always form a disjoint, exact
//! cover of `[0, width) x [0, height)`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: i32 = 100;

/// An axis-aligned rectangle in task pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl TileRect {
    /// Whether the tile lies entirely inside an image of the given size.
    pub fn fits_within(&self, image_width: i32, image_height: i32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.width > 0
            && self.height > 0
            && i64::from(self.x) + i64::from(self.width) <= i64::from(image_width)
            && i64::from(self.y) + i64::from(self.height) <= i64::from(image_height)
    }

    /// Raster ordering key: top row first, then left to right.
    pub fn raster_key(&self) -> (i32, i32) {
        (self.y, self.x)
    }
}

/// Number of tiles [`generate_tiles`] produces for the given extent.
pub fn tile_count(width: i32, height: i32, tile_size: i32) -> Result<usize, CoreError> {
    ensure_positive("width", width)?;
    ensure_positive("height", height)?;
    ensure_positive("tile_size", tile_size)?;
    let cols = div_ceil(width, tile_size);
    let rows = div_ceil(height, tile_size);
    Ok(cols * rows)
}

/// Tile a `width x height` rectangle into `tile_size` squares in raster order.
///
/// All tiles of one row come before any tile of the next row. The last
/// column and the last row are clipped to the remaining extent.
pub fn generate_tiles(width: i32, height: i32, tile_size: i32) -> Result<Vec<TileRect>, CoreError> {
    let mut tiles = Vec::with_capacity(tile_count(width, height, tile_size)?);

    // Step in i64 so `y + tile_size` cannot overflow near i32::MAX.
    let (w, h, step) = (i64::from(width), i64::from(height), i64::from(tile_size));
    let mut y = 0i64;
    while y < h {
        let tile_h = step.min(h - y);
        let mut x = 0i64;
        while x < w {
            let tile_w = step.min(w - x);
            tiles.push(TileRect {
                x: x as i32,
                y: y as i32,
                width: tile_w as i32,
                height: tile_h as i32,
            });
            x += step;
        }
        y += step;
    }

    Ok(tiles)
}

fn ensure_positive(field: &'static str, value: i32) -> Result<(), CoreError> {
    if value <= 0 {
        return Err(CoreError::InvalidDimension {
            field,
            value: i64::from(value),
        });
    }
    Ok(())
}

fn div_ceil(extent: i32, step: i32) -> usize {
    ((i64::from(extent) + i64::from(step) - 1) / i64::from(step)) as usize
}
