//! In-memory [`JobStore`].
//!
//! Backs single-process deployments without Postgres and the service-level
//! tests. Each operation holds the table lock for its whole duration, which
//! gives the same per-row check-and-set guarantee the Postgres queries rely
//! on. Task creation stages all rows before publishing them, so a failed
//! batch leaves nothing behind.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tilefarm_core::task::TaskParams;
use tilefarm_core::tiling::TileRect;
use tilefarm_core::types::{DbId, Timestamp};
use tokio::sync::RwLock;

use crate::models::job::Job;
use crate::models::status::JobStatus;
use crate::models::task::{Task, TaskProgress};
use crate::repositories::JobRepo;
use crate::store::{is_claimable, ClaimOutcome, JobStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    tasks: BTreeMap<DbId, Task>,
    jobs: BTreeMap<DbId, Job>,
    next_task_id: DbId,
    next_job_id: DbId,
}

impl Tables {
    fn jobs_of(&self, task_id: DbId) -> impl Iterator<Item = &Job> {
        self.jobs.values().filter(move |job| job.task_id == task_id)
    }

    /// Lowest `(y, x)` eligible job id of a task.
    fn next_eligible(&self, task_id: DbId, stale_before: Option<Timestamp>) -> Option<DbId> {
        self.jobs_of(task_id)
            .filter(|job| is_claimable(job, stale_before))
            .min_by_key(|job| (job.y, job.x))
            .map(|job| job.id)
    }

    fn mark_started(&mut self, job_id: DbId, worker_id: &str) -> Option<Job> {
        let job = self.jobs.get_mut(&job_id)?;
        job.status_id = JobStatus::Started.id();
        job.assigned_worker_id = Some(worker_id.to_string());
        job.started_at = Some(Utc::now());
        Some(job.clone())
    }
}

/// Process-local job store guarded by a single `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    tables: RwLock<Tables>,
    /// Zero-based job batch index at which `create_task` fails.
    fail_on_batch: Option<usize>,
    batch_statements: AtomicUsize,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose task creation fails while writing job batch
    /// `batch_index`, after earlier batches were written.
    pub fn failing_on_batch(batch_index: usize) -> Self {
        Self {
            fail_on_batch: Some(batch_index),
            ..Self::default()
        }
    }

    /// Number of job batch inserts executed, including failed attempts.
    pub fn batch_statements(&self) -> usize {
        self.batch_statements.load(Ordering::Relaxed)
    }

    /// Total rows across both tables.
    pub async fn row_counts(&self) -> (usize, usize) {
        let tables = self.tables.read().await;
        (tables.tasks.len(), tables.jobs.len())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_task(
        &self,
        params: &TaskParams,
        tiles: &[TileRect],
        batch_size: usize,
    ) -> Result<Task, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        let task_id = tables.next_task_id + 1;
        let task = Task::from_params(task_id, params, now);

        let mut next_job_id = tables.next_job_id;
        let mut staged = Vec::with_capacity(tiles.len());
        for (batch_index, batch) in tiles.chunks(JobRepo::clamp_batch_size(batch_size)).enumerate() {
            self.batch_statements.fetch_add(1, Ordering::Relaxed);
            if self.fail_on_batch == Some(batch_index) {
                tracing::warn!(task_id, batch_index, "Job batch insert failed, rolling back task");
                return Err(StoreError::Unavailable(format!(
                    "job batch {batch_index} insert failed"
                )));
            }
            for tile in batch {
                next_job_id += 1;
                staged.push(Job {
                    id: next_job_id,
                    task_id,
                    x: tile.x,
                    y: tile.y,
                    width: tile.width,
                    height: tile.height,
                    status_id: JobStatus::Created.id(),
                    assigned_worker_id: None,
                    created_at: now,
                    started_at: None,
                    completed_at: None,
                    result_data: None,
                });
            }
        }

        // Commit: publish the task and every job under the same write lock.
        tables.next_task_id = task_id;
        tables.next_job_id = next_job_id;
        tables.tasks.insert(task_id, task.clone());
        for job in staged {
            tables.jobs.insert(job.id, job);
        }
        Ok(task)
    }

    async fn find_task(&self, task_id: DbId) -> Result<Option<Task>, StoreError> {
        Ok(self.tables.read().await.tasks.get(&task_id).cloned())
    }

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(self.tables.read().await.jobs.get(&job_id).cloned())
    }

    async fn next_job(
        &self,
        task_id: DbId,
        stale_before: Option<Timestamp>,
    ) -> Result<Option<Job>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .next_eligible(task_id, stale_before)
            .and_then(|id| tables.jobs.get(&id).cloned()))
    }

    async fn start_job(&self, job_id: DbId, worker_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.tables.write().await.mark_started(job_id, worker_id))
    }

    async fn try_claim_job(
        &self,
        job_id: DbId,
        worker_id: &str,
        stale_before: Option<Timestamp>,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(job) = tables.jobs.get(&job_id) else {
            return Ok(ClaimOutcome::NotFound);
        };
        if !is_claimable(job, stale_before) {
            return Ok(ClaimOutcome::Lost(job.status_id));
        }
        Ok(match tables.mark_started(job_id, worker_id) {
            Some(job) => ClaimOutcome::Claimed(job),
            None => ClaimOutcome::NotFound,
        })
    }

    async fn claim_next_job(
        &self,
        task_id: DbId,
        worker_id: &str,
        stale_before: Option<Timestamp>,
    ) -> Result<Option<Job>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .next_eligible(task_id, stale_before)
            .and_then(|id| tables.mark_started(id, worker_id)))
    }

    async fn complete_job(&self, job_id: DbId, result: &[u8]) -> Result<Option<Job>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(job) = tables.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        job.status_id = JobStatus::Completed.id();
        job.result_data = Some(result.to_vec());
        job.completed_at = Some(Utc::now());
        Ok(Some(job.clone()))
    }

    async fn list_jobs(&self, task_id: DbId) -> Result<Vec<Job>, StoreError> {
        let tables = self.tables.read().await;
        let mut jobs: Vec<Job> = tables.jobs_of(task_id).cloned().collect();
        jobs.sort_by_key(|job| (job.y, job.x));
        Ok(jobs)
    }

    async fn task_progress(&self, task_id: DbId) -> Result<TaskProgress, StoreError> {
        let tables = self.tables.read().await;
        let mut progress = TaskProgress {
            task_id,
            total: 0,
            created: 0,
            started: 0,
            completed: 0,
        };
        for job in tables.jobs_of(task_id) {
            progress.total += 1;
            match job.status() {
                Some(JobStatus::Created) => progress.created += 1,
                Some(JobStatus::Started) => progress.started += 1,
                Some(JobStatus::Completed) => progress.completed += 1,
                None => {}
            }
        }
        Ok(progress)
    }
}
