//! Task preview assembly.
//!
//! Reads every job of a task, places the completed tiles and encodes the
//! result as a PNG. Unfinished regions stay transparent. Tasks larger than
//! the configured pixel budget are refused before anything is loaded;
//! assembly and encoding run on the blocking pool.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};
use tilefarm_core::aggregation::{assemble, check_preview_size, Assembly, TilePixels};
use tilefarm_core::error::CoreError;
use tilefarm_core::types::DbId;
use tilefarm_db::models::job::Job;
use tilefarm_db::models::status::JobStatus;
use tilefarm_db::models::task::Task;
use tilefarm_db::JobStore;

use crate::error::{AppError, AppResult};

/// Builds full-resolution images from completed jobs.
pub struct ResultAggregator {
    store: Arc<dyn JobStore>,
    max_pixels: u64,
}

impl ResultAggregator {
    pub fn new(store: Arc<dyn JobStore>, max_pixels: u64) -> Self {
        Self { store, max_pixels }
    }

    /// Raw RGBA assembly of a task.
    pub async fn assemble_task(&self, task_id: DbId) -> AppResult<Assembly> {
        let (task, jobs) = self.load(task_id).await?;
        run_blocking(move || assemble_jobs(&task, &jobs)).await
    }

    /// PNG-encoded preview of a task.
    pub async fn task_png(&self, task_id: DbId) -> AppResult<Vec<u8>> {
        let (task, jobs) = self.load(task_id).await?;
        run_blocking(move || encode_png(assemble_jobs(&task, &jobs)?)).await
    }

    async fn load(&self, task_id: DbId) -> AppResult<(Task, Vec<Job>)> {
        let task = self
            .store
            .find_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Task", task_id))?;
        check_preview_size(task.width, task.height, self.max_pixels)?;

        let jobs = self.store.list_jobs(task_id).await?;
        Ok((task, jobs))
    }
}

async fn run_blocking<T, F>(work: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AppError::InternalError(format!("Preview task failed: {e}")))?
}

fn assemble_jobs(task: &Task, jobs: &[Job]) -> AppResult<Assembly> {
    let assembly = assemble(
        task.width,
        task.height,
        jobs.iter().map(|job| TilePixels {
            rect: job.rect(),
            data: match job.status() {
                Some(JobStatus::Completed) => job.result_data.as_deref(),
                _ => None,
            },
        }),
    )?;

    if !assembly.skipped.is_empty() {
        tracing::warn!(
            task_id = task.id,
            skipped = assembly.skipped.len(),
            "Skipped malformed tile results",
        );
    }
    Ok(assembly)
}

fn encode_png(assembly: Assembly) -> AppResult<Vec<u8>> {
    let image = RgbaImage::from_raw(assembly.width, assembly.height, assembly.pixels)
        .ok_or_else(|| AppError::InternalError("Assembled buffer has the wrong size".into()))?;

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| AppError::InternalError(format!("PNG encoding failed: {e}")))?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tilefarm_core::aggregation::DEFAULT_PREVIEW_MAX_PIXELS;
    use tilefarm_core::task::CreateTaskRequest;
    use tilefarm_core::tiling::generate_tiles;
    use tilefarm_db::MemoryJobStore;

    use super::*;

    async fn seeded(width: i32, height: i32) -> (Arc<MemoryJobStore>, DbId) {
        let store = Arc::new(MemoryJobStore::new());
        let params = CreateTaskRequest {
            scene_mesh_url: Some("mesh.obj".into()),
            cam_position_x: Some(0.0),
            cam_position_y: Some(0.0),
            cam_position_z: Some(1.0),
            cam_target_x: Some(0.0),
            cam_target_y: Some(0.0),
            cam_target_z: Some(0.0),
            width: Some(width.into()),
            height: Some(height.into()),
            ..Default::default()
        }
        .resolve()
        .unwrap();
        let tiles = generate_tiles(width, height, 100).unwrap();
        let task = store.create_task(&params, &tiles, 1000).await.unwrap();
        (store, task.id)
    }

    #[tokio::test]
    async fn only_completed_jobs_are_placed() {
        let (store, task_id) = seeded(150, 100).await;
        let jobs = store.list_jobs(task_id).await.unwrap();

        store.complete_job(jobs[0].id, &vec![255; 100 * 100 * 4]).await.unwrap();
        store.complete_job(jobs[1].id, &vec![255; 50 * 100 * 4]).await.unwrap();
        // Re-started after completion: its old payload must not show.
        store.start_job(jobs[1].id, "w").await.unwrap();

        let aggregator = ResultAggregator::new(store, DEFAULT_PREVIEW_MAX_PIXELS);
        let assembly = aggregator.assemble_task(task_id).await.unwrap();

        assert_eq!(assembly.placed, 1);
        assert_eq!(assembly.pending, 1);
        assert_eq!(&assembly.pixels[..4], &[255, 255, 255, 255]);
        let right = (10 * 150 + 120) * 4;
        assert_eq!(&assembly.pixels[right..right + 4], &[0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn malformed_result_does_not_blank_preview() {
        let (store, task_id) = seeded(200, 100).await;
        let jobs = store.list_jobs(task_id).await.unwrap();
        store.complete_job(jobs[0].id, &[1, 2, 3]).await.unwrap();
        store.complete_job(jobs[1].id, &vec![9; 100 * 100 * 4]).await.unwrap();

        let aggregator = ResultAggregator::new(store, DEFAULT_PREVIEW_MAX_PIXELS);
        let assembly = aggregator.assemble_task(task_id).await.unwrap();

        assert_eq!(assembly.placed, 1);
        assert_eq!(assembly.skipped.len(), 1);
    }

    #[tokio::test]
    async fn png_has_png_signature() {
        let (store, task_id) = seeded(100, 100).await;
        let aggregator = ResultAggregator::new(store, DEFAULT_PREVIEW_MAX_PIXELS);

        let png = aggregator.task_png(task_id).await.unwrap();

        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn oversized_preview_refused() {
        let (store, task_id) = seeded(200, 100).await;
        let aggregator = ResultAggregator::new(store, 200 * 100 - 1);

        let err = aggregator.task_png(task_id).await.unwrap_err();
        assert_matches!(err, AppError::Core(CoreError::Validation(_)));
    }
}
