//! Result aggregation: stitch completed tile buffers into one image.
//!
//! Tile payloads are raw, row-major pixels with [`CHANNELS`] bytes per
//! pixel. A payload whose size does not match its tile, or a tile that
//! escapes the image, is skipped so one bad tile cannot blank the rest.

use crate::error::CoreError;
use crate::tiling::TileRect;

/// Bytes per pixel in tile payloads (RGBA8).
pub const CHANNELS: usize = 4;

/// Default ceiling on the pixel count of an assembled preview (16 MP).
pub const DEFAULT_PREVIEW_MAX_PIXELS: u64 = 16_777_216;

/// One tile's contribution to an assembly.
#[derive(Debug, Clone, Copy)]
pub struct TilePixels<'a> {
    pub rect: TileRect,
    /// Raw pixels; `None` for tiles not yet completed.
    pub data: Option<&'a [u8]>,
}

/// Expected payload length for a tile, or `None` for a degenerate rect.
pub fn expected_len(rect: &TileRect) -> Option<usize> {
    if rect.width <= 0 || rect.height <= 0 {
        return None;
    }
    (rect.width as usize)
        .checked_mul(rect.height as usize)?
        .checked_mul(CHANNELS)
}

/// Reject previews whose canvas would exceed `max_pixels`.
///
/// Checked before any buffer is allocated: the canvas alone needs
/// `width * height * CHANNELS` bytes.
pub fn check_preview_size(width: i32, height: i32, max_pixels: u64) -> Result<(), CoreError> {
    let pixels = width.max(0) as u64 * height.max(0) as u64;
    if pixels > max_pixels {
        return Err(CoreError::Validation(format!(
            "Preview of {width}x{height} exceeds the limit of {max_pixels} pixels"
        )));
    }
    Ok(())
}

/// A full-resolution RGBA buffer plus bookkeeping about what went in.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    /// Tiles whose pixels were copied.
    pub placed: usize,
    /// Tiles without a payload yet.
    pub pending: usize,
    /// Tiles skipped because of a malformed payload or rect.
    pub skipped: Vec<TileRect>,
}

/// Copy each tile's payload into a zeroed `width x height` buffer at its
/// absolute offset. Unfinished regions stay fully transparent.
pub fn assemble<'a, I>(width: i32, height: i32, tiles: I) -> Result<Assembly, CoreError>
where
    I: IntoIterator<Item = TilePixels<'a>>,
{
    if width <= 0 {
        return Err(CoreError::InvalidDimension { field: "width", value: i64::from(width) });
    }
    if height <= 0 {
        return Err(CoreError::InvalidDimension { field: "height", value: i64::from(height) });
    }

    let row_stride = width as usize * CHANNELS;
    let mut pixels = vec![0u8; row_stride * height as usize];
    let mut placed = 0;
    let mut pending = 0;
    let mut skipped = Vec::new();

    for tile in tiles {
        let Some(data) = tile.data else {
            pending += 1;
            continue;
        };
        let rect = tile.rect;
        if !rect.fits_within(width, height) || expected_len(&rect) != Some(data.len()) {
            skipped.push(rect);
            continue;
        }

        let tile_stride = rect.width as usize * CHANNELS;
        for (row, src) in data.chunks_exact(tile_stride).enumerate() {
            let start = (rect.y as usize + row) * row_stride + rect.x as usize * CHANNELS;
            pixels[start..start + tile_stride].copy_from_slice(src);
        }
        placed += 1;
    }

    Ok(Assembly {
        width: width as u32,
        height: height as u32,
        pixels,
        placed,
        pending,
        skipped,
    })
}
