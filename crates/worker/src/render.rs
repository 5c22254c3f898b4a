//! Tile rendering capability.
//!
//! Real deployments plug a GPU path tracer in behind [`TileRenderer`]. The
//! contract is fixed: the returned buffer holds exactly
//! `width * height * CHANNELS` bytes of row-major RGBA for the job's rect.

use async_trait::async_trait;
use tilefarm_core::aggregation::{expected_len, CHANNELS};

use crate::client::{JobInfo, TaskInfo};

/// Renders one tile of a task.
#[async_trait]
pub trait TileRenderer: Send + Sync {
    async fn render(&self, job: &JobInfo, task: &TaskInfo) -> anyhow::Result<Vec<u8>>;
}

/// Deterministic test pattern: red follows the absolute x coordinate,
/// green the absolute y, blue is keyed by task id. Tiles line up into one
/// smooth gradient when assembled.
#[derive(Debug, Default, Clone, Copy)]
pub struct GradientRenderer;

impl GradientRenderer {
    fn channel(position: i32, extent: i32) -> u8 {
        if extent <= 1 {
            return 0;
        }
        (i64::from(position) * 255 / i64::from(extent - 1)).clamp(0, 255) as u8
    }

    pub fn pixel(task: &TaskInfo, x: i32, y: i32) -> [u8; CHANNELS] {
        [
            Self::channel(x, task.width),
            Self::channel(y, task.height),
            (task.id.rem_euclid(256)) as u8,
            u8::MAX,
        ]
    }
}

#[async_trait]
impl TileRenderer for GradientRenderer {
    async fn render(&self, job: &JobInfo, task: &TaskInfo) -> anyhow::Result<Vec<u8>> {
        let len = expected_len(&job.rect())
            .ok_or_else(|| anyhow::anyhow!("job {} has an empty rect", job.id))?;

        let mut pixels = Vec::with_capacity(len);
        for y in job.y..job.y + job.height {
            for x in job.x..job.x + job.width {
                pixels.extend_from_slice(&Self::pixel(task, x, y));
            }
        }
        Ok(pixels)
    }
}
