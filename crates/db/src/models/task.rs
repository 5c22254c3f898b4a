//! Task entity model (one full-image render request).

use serde::Serialize;
use sqlx::FromRow;
use tilefarm_core::task::TaskParams;
use tilefarm_core::types::{DbId, Timestamp};

/// A row from the `tasks` table. Never updated after insert.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub scene_mesh_url: String,
    pub scene_bvh_url: String,
    pub scene_textures_url: String,
    pub cam_position_x: f64,
    pub cam_position_y: f64,
    pub cam_position_z: f64,
    pub cam_target_x: f64,
    pub cam_target_y: f64,
    pub cam_target_z: f64,
    pub fov: f64,
    pub width: i32,
    pub height: i32,
    pub max_bounces: i32,
    pub samples_per_pixel: i32,
    pub created_at: Timestamp,
}

impl Task {
    /// Build a row from resolved parameters. Used by stores that assign
    /// ids themselves.
    pub fn from_params(id: DbId, params: &TaskParams, created_at: Timestamp) -> Self {
        Self {
            id,
            scene_mesh_url: params.scene_mesh_url.clone(),
            scene_bvh_url: params.scene_bvh_url.clone(),
            scene_textures_url: params.scene_textures_url.clone(),
            cam_position_x: params.cam_position_x,
            cam_position_y: params.cam_position_y,
            cam_position_z: params.cam_position_z,
            cam_target_x: params.cam_target_x,
            cam_target_y: params.cam_target_y,
            cam_target_z: params.cam_target_z,
            fov: params.fov,
            width: params.width,
            height: params.height,
            max_bounces: params.max_bounces,
            samples_per_pixel: params.samples_per_pixel,
            created_at,
        }
    }
}

/// Response body for a successful task creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedTask {
    pub task_id: DbId,
    pub job_count: usize,
}

/// Per-status job counts for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub task_id: DbId,
    pub total: i64,
    pub created: i64,
    pub started: i64,
    pub completed: i64,
}

impl TaskProgress {
    /// True once every job has a stored result.
    pub fn is_finished(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}
