//! Task decomposition.
//!
//! Resolves a render request into task parameters, cuts the image into
//! tiles and persists the task together with one `created` job per tile.
//! The store writes the task and every job batch as a single atomic unit.

use std::sync::Arc;

use tilefarm_core::task::CreateTaskRequest;
use tilefarm_core::tiling::generate_tiles;
use tilefarm_db::models::task::CreatedTask;
use tilefarm_db::JobStore;

use crate::error::AppResult;

/// Creates tasks and their job sets.
pub struct TaskDecomposer {
    store: Arc<dyn JobStore>,
    tile_size: i32,
    batch_size: usize,
}

impl TaskDecomposer {
    pub fn new(store: Arc<dyn JobStore>, tile_size: i32, batch_size: usize) -> Self {
        Self {
            store,
            tile_size,
            batch_size,
        }
    }

    /// Validate `request`, then insert the task and all of its jobs.
    ///
    /// Validation happens before any write, so a rejected request leaves
    /// the store untouched.
    pub async fn create_task(&self, request: CreateTaskRequest) -> AppResult<CreatedTask> {
        let params = request.resolve()?;
        let tiles = generate_tiles(params.width, params.height, self.tile_size)?;

        let task = self
            .store
            .create_task(&params, &tiles, self.batch_size)
            .await?;

        tracing::info!(
            task_id = task.id,
            width = task.width,
            height = task.height,
            job_count = tiles.len(),
            "Task created",
        );

        Ok(CreatedTask {
            task_id: task.id,
            job_count: tiles.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tilefarm_core::error::CoreError;
    use tilefarm_db::MemoryJobStore;

    use super::*;
    use crate::error::AppError;

    fn request(width: i64, height: i64) -> CreateTaskRequest {
        CreateTaskRequest {
            scene_mesh_url: Some("https://bucket.s3.amazonaws.com/uploads/room.glb".into()),
            cam_position_x: Some(0.0),
            cam_position_y: Some(2.0),
            cam_position_z: Some(6.0),
            cam_target_x: Some(0.0),
            cam_target_y: Some(0.0),
            cam_target_z: Some(0.0),
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn creates_one_job_per_tile() {
        let store = Arc::new(MemoryJobStore::new());
        let decomposer = TaskDecomposer::new(store.clone(), 100, 1000);

        let created = decomposer.create_task(request(250, 250)).await.unwrap();

        assert_eq!(created.job_count, 9);
        let jobs = store.list_jobs(created.task_id).await.unwrap();
        assert_eq!(jobs.len(), 9);
        assert_eq!(
            jobs.iter().map(|j| (j.width, j.height)).collect::<Vec<_>>(),
            [
                (100, 100), (100, 100), (50, 100),
                (100, 100), (100, 100), (50, 100),
                (100, 50), (100, 50), (50, 50),
            ]
        );
    }

    #[tokio::test]
    async fn defaults_applied_to_stored_task() {
        let store = Arc::new(MemoryJobStore::new());
        let decomposer = TaskDecomposer::new(store.clone(), 100, 1000);

        let created = decomposer.create_task(request(64, 64)).await.unwrap();
        let task = store.find_task(created.task_id).await.unwrap().unwrap();

        assert_eq!(task.fov, 45.0);
        assert_eq!(task.max_bounces, 3);
        assert_eq!(task.samples_per_pixel, 1);
        assert_eq!(task.scene_bvh_url, "");
    }

    #[tokio::test]
    async fn invalid_request_writes_nothing() {
        let store = Arc::new(MemoryJobStore::new());
        let decomposer = TaskDecomposer::new(store.clone(), 100, 1000);

        let err = decomposer.create_task(request(0, 100)).await.unwrap_err();
        assert_matches!(err, AppError::Core(CoreError::InvalidDimension { field: "width", .. }));

        let mut missing_mesh = request(100, 100);
        missing_mesh.scene_mesh_url = None;
        let err = decomposer.create_task(missing_mesh).await.unwrap_err();
        assert_matches!(err, AppError::Core(CoreError::Validation(_)));

        assert_eq!(store.row_counts().await, (0, 0));
    }

    #[tokio::test]
    async fn storage_failure_rolls_back_whole_task() {
        let store = Arc::new(MemoryJobStore::failing_on_batch(2));
        let decomposer = TaskDecomposer::new(store.clone(), 10, 3);

        let err = decomposer.create_task(request(100, 10)).await.unwrap_err();

        assert_matches!(err, AppError::Store(_));
        assert_eq!(store.batch_statements(), 3);
        assert_eq!(store.row_counts().await, (0, 0));
    }
}
