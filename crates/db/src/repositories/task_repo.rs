//! Repository for the `tasks` table.
//!
//! Task creation is the only multi-row write in the system: the task row
//! and its whole job set are inserted in one transaction, so a task with
//! partial job coverage is never visible.

use sqlx::PgPool;
use tilefarm_core::task::TaskParams;
use tilefarm_core::tiling::TileRect;
use tilefarm_core::types::DbId;

use crate::models::status::JobStatus;
use crate::models::task::{Task, TaskProgress};
use crate::repositories::JobRepo;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, scene_mesh_url, scene_bvh_url, scene_textures_url, \
    cam_position_x, cam_position_y, cam_position_z, \
    cam_target_x, cam_target_y, cam_target_z, \
    fov, width, height, max_bounces, samples_per_pixel, created_at";

/// Provides create/read operations for render tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a task and all of its jobs atomically.
    ///
    /// Jobs are written in batches of `batch_size` rows to stay under the
    /// Postgres bind-parameter limit. Every batch runs inside the same
    /// transaction; any failure drops the transaction, which rolls back
    /// the task row as well.
    pub async fn create_with_jobs(
        pool: &PgPool,
        params: &TaskParams,
        tiles: &[TileRect],
        batch_size: usize,
    ) -> Result<Task, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO tasks ( \
                 scene_mesh_url, scene_bvh_url, scene_textures_url, \
                 cam_position_x, cam_position_y, cam_position_z, \
                 cam_target_x, cam_target_y, cam_target_z, \
                 fov, width, height, max_bounces, samples_per_pixel \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {COLUMNS}"
        );
        let task = sqlx::query_as::<_, Task>(&query)
            .bind(&params.scene_mesh_url)
            .bind(&params.scene_bvh_url)
            .bind(&params.scene_textures_url)
            .bind(params.cam_position_x)
            .bind(params.cam_position_y)
            .bind(params.cam_position_z)
            .bind(params.cam_target_x)
            .bind(params.cam_target_y)
            .bind(params.cam_target_z)
            .bind(params.fov)
            .bind(params.width)
            .bind(params.height)
            .bind(params.max_bounces)
            .bind(params.samples_per_pixel)
            .fetch_one(&mut *tx)
            .await?;

        let batch_size = JobRepo::clamp_batch_size(batch_size);
        for (batch_index, batch) in tiles.chunks(batch_size).enumerate() {
            JobRepo::insert_batch(&mut tx, task.id, batch).await?;
            tracing::debug!(
                task_id = task.id,
                batch_index,
                rows = batch.len(),
                "Inserted job batch",
            );
        }

        tx.commit().await?;
        Ok(task)
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Count the task's jobs per status.
    pub async fn progress(pool: &PgPool, task_id: DbId) -> Result<TaskProgress, sqlx::Error> {
        let (total, created, started, completed): (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COUNT(*) FILTER (WHERE status_id = $2), \
                    COUNT(*) FILTER (WHERE status_id = $3), \
                    COUNT(*) FILTER (WHERE status_id = $4) \
             FROM jobs WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(JobStatus::Created.id())
        .bind(JobStatus::Started.id())
        .bind(JobStatus::Completed.id())
        .fetch_one(pool)
        .await?;

        Ok(TaskProgress {
            task_id,
            total,
            created,
            started,
            completed,
        })
    }
}
