//! The job store seam.
//!
//! The service layer talks to [`JobStore`] rather than to a pool directly,
//! so the same task/job state machine runs against Postgres in production
//! and against [`crate::MemoryJobStore`] in single-process setups and tests.

use async_trait::async_trait;
use tilefarm_core::task::TaskParams;
use tilefarm_core::tiling::TileRect;
use tilefarm_core::types::{DbId, Timestamp};

use crate::models::job::Job;
use crate::models::status::{JobStatus, StatusId};
use crate::models::task::{Task, TaskProgress};
use crate::repositories::{JobRepo, TaskRepo};
use crate::DbPool;

/// Persistence failure. Maps to the storage error class at the API edge.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result of a conditional claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// This caller moved the job to `started`.
    Claimed(Job),
    /// The job exists but was not claimable; carries its current status.
    Lost(StatusId),
    /// No job with that id.
    NotFound,
}

/// Task and job persistence with the claim and completion transitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Verify the backing store is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Insert a task and its full job set as one atomic unit, `batch_size`
    /// jobs per insert statement.
    async fn create_task(
        &self,
        params: &TaskParams,
        tiles: &[TileRect],
        batch_size: usize,
    ) -> Result<Task, StoreError>;

    async fn find_task(&self, task_id: DbId) -> Result<Option<Task>, StoreError>;

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, StoreError>;

    /// Lowest `(y, x)` eligible job of a task. Read only.
    async fn next_job(
        &self,
        task_id: DbId,
        stale_before: Option<Timestamp>,
    ) -> Result<Option<Job>, StoreError>;

    /// Unconditional `-> started` write. `None` if the job does not exist.
    async fn start_job(&self, job_id: DbId, worker_id: &str) -> Result<Option<Job>, StoreError>;

    /// Conditional `created -> started` (or stale `started -> started`).
    async fn try_claim_job(
        &self,
        job_id: DbId,
        worker_id: &str,
        stale_before: Option<Timestamp>,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Select and claim the lowest eligible job in one atomic step.
    async fn claim_next_job(
        &self,
        task_id: DbId,
        worker_id: &str,
        stale_before: Option<Timestamp>,
    ) -> Result<Option<Job>, StoreError>;

    /// Store a result and mark the job completed, overwriting any earlier
    /// result. `None` if the job does not exist.
    async fn complete_job(&self, job_id: DbId, result: &[u8]) -> Result<Option<Job>, StoreError>;

    /// All jobs of a task in raster order.
    async fn list_jobs(&self, task_id: DbId) -> Result<Vec<Job>, StoreError>;

    async fn task_progress(&self, task_id: DbId) -> Result<TaskProgress, StoreError>;
}

/// Postgres-backed [`JobStore`] delegating to the repositories.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    async fn create_task(
        &self,
        params: &TaskParams,
        tiles: &[TileRect],
        batch_size: usize,
    ) -> Result<Task, StoreError> {
        Ok(TaskRepo::create_with_jobs(&self.pool, params, tiles, batch_size).await?)
    }

    async fn find_task(&self, task_id: DbId) -> Result<Option<Task>, StoreError> {
        Ok(TaskRepo::find_by_id(&self.pool, task_id).await?)
    }

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::find_by_id(&self.pool, job_id).await?)
    }

    async fn next_job(
        &self,
        task_id: DbId,
        stale_before: Option<Timestamp>,
    ) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::next_for_task(&self.pool, task_id, stale_before).await?)
    }

    async fn start_job(&self, job_id: DbId, worker_id: &str) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::start(&self.pool, job_id, worker_id).await?)
    }

    async fn try_claim_job(
        &self,
        job_id: DbId,
        worker_id: &str,
        stale_before: Option<Timestamp>,
    ) -> Result<ClaimOutcome, StoreError> {
        if let Some(job) = JobRepo::try_claim(&self.pool, job_id, worker_id, stale_before).await? {
            return Ok(ClaimOutcome::Claimed(job));
        }
        // Lost the race or never claimable; report which.
        Ok(match JobRepo::status_of(&self.pool, job_id).await? {
            Some(status_id) => ClaimOutcome::Lost(status_id),
            None => ClaimOutcome::NotFound,
        })
    }

    async fn claim_next_job(
        &self,
        task_id: DbId,
        worker_id: &str,
        stale_before: Option<Timestamp>,
    ) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::claim_next(&self.pool, task_id, worker_id, stale_before).await?)
    }

    async fn complete_job(&self, job_id: DbId, result: &[u8]) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::complete(&self.pool, job_id, result).await?)
    }

    async fn list_jobs(&self, task_id: DbId) -> Result<Vec<Job>, StoreError> {
        Ok(JobRepo::list_by_task(&self.pool, task_id).await?)
    }

    async fn task_progress(&self, task_id: DbId) -> Result<TaskProgress, StoreError> {
        Ok(TaskRepo::progress(&self.pool, task_id).await?)
    }
}

/// Whether a job may be claimed given the recovery cutoff.
pub(crate) fn is_claimable(job: &Job, stale_before: Option<Timestamp>) -> bool {
    match job.status() {
        Some(JobStatus::Created) => true,
        Some(JobStatus::Started) => match (stale_before, job.started_at) {
            (Some(cutoff), Some(started_at)) => started_at < cutoff,
            _ => false,
        },
        _ => false,
    }
}
