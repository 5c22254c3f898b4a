//! Job dispatcher for polling render workers.
//!
//! The base protocol is two calls: [`JobDispatcher::next_job`] selects the
//! lowest raster-ordered `created` job without changing it, then the worker
//! calls [`JobDispatcher::start_job`]. Nothing holds the job between those
//! calls, so two workers polling at the same moment can be handed the same
//! job and both render it. Completion overwrites, so the second result
//! simply replaces the first. The guarantee is that no job is lost, not
//! that each job is rendered once.
//!
//! Callers that need a single owner per job use
//! [`JobDispatcher::claim_next`], or enable strict claiming, which turns
//! `start_job` into a conditional `created -> started` write.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde::Serialize;
use tilefarm_core::error::CoreError;
use tilefarm_core::types::{DbId, Timestamp};
use tilefarm_db::models::job::Job;
use tilefarm_db::models::status::JobStatus;
use tilefarm_db::models::task::{Task, TaskProgress};
use tilefarm_db::{ClaimOutcome, JobStore};

use crate::engine::signing::SceneUrlSigner;
use crate::error::AppResult;

/// Worker id recorded when a start request does not name one.
pub const UNKNOWN_WORKER_ID: &str = "unknown-worker";

/// A job handed to a worker together with what it needs to render it.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchedJob {
    pub job: Job,
    /// The owning task, with scene locators already signed.
    pub task: Task,
}

/// Hands out jobs and records their transitions.
pub struct JobDispatcher {
    store: Arc<dyn JobStore>,
    signer: Arc<dyn SceneUrlSigner>,
    strict_claim: bool,
    stale_job_timeout: Option<Duration>,
}

impl JobDispatcher {
    pub fn new(store: Arc<dyn JobStore>, signer: Arc<dyn SceneUrlSigner>) -> Self {
        Self {
            store,
            signer,
            strict_claim: false,
            stale_job_timeout: None,
        }
    }

    /// Make [`Self::start_job`] fail with `Conflict` unless the job is
    /// still claimable.
    pub fn with_strict_claim(mut self, strict: bool) -> Self {
        self.strict_claim = strict;
        self
    }

    /// Treat `started` jobs older than `timeout` as claimable again.
    pub fn with_stale_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stale_job_timeout = timeout;
        self
    }

    /// Recovery cutoff for the current instant, if recovery is enabled.
    fn stale_before(&self) -> Option<Timestamp> {
        let timeout = TimeDelta::from_std(self.stale_job_timeout?).ok()?;
        Utc::now().checked_sub_signed(timeout)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get_task(&self, task_id: DbId) -> AppResult<Task> {
        self.store
            .find_task(task_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Task", task_id).into())
    }

    pub async fn get_job(&self, job_id: DbId) -> AppResult<Job> {
        self.store
            .find_job(job_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Job", job_id).into())
    }

    /// All jobs of a task in raster order, result payloads included.
    pub async fn list_jobs(&self, task_id: DbId) -> AppResult<Vec<Job>> {
        self.get_task(task_id).await?;
        Ok(self.store.list_jobs(task_id).await?)
    }

    pub async fn progress(&self, task_id: DbId) -> AppResult<TaskProgress> {
        self.get_task(task_id).await?;
        Ok(self.store.task_progress(task_id).await?)
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Select the next job of a task without claiming it.
    ///
    /// `None` means nothing is claimable right now. Jobs may still be in
    /// flight, so this is not a completion signal.
    pub async fn next_job(&self, task_id: DbId) -> AppResult<Option<DispatchedJob>> {
        let task = self.get_task(task_id).await?;
        let Some(job) = self.store.next_job(task_id, self.stale_before()).await? else {
            tracing::debug!(task_id, "No claimable job");
            return Ok(None);
        };
        Ok(Some(self.dispatch(job, task).await))
    }

    /// Select and claim the next job in one atomic step.
    pub async fn claim_next(
        &self,
        task_id: DbId,
        worker_id: &str,
    ) -> AppResult<Option<DispatchedJob>> {
        let task = self.get_task(task_id).await?;
        let claimed = self
            .store
            .claim_next_job(task_id, worker_id, self.stale_before())
            .await?;
        let Some(job) = claimed else {
            tracing::debug!(task_id, worker_id, "No claimable job");
            return Ok(None);
        };

        tracing::info!(task_id, job_id = job.id, worker_id, "Job claimed");
        Ok(Some(self.dispatch(job, task).await))
    }

    /// Record that `worker_id` started rendering a job.
    ///
    /// Without strict claiming this overwrites whatever state the job was
    /// in, including `completed`.
    pub async fn start_job(&self, job_id: DbId, worker_id: &str) -> AppResult<Job> {
        if !self.strict_claim {
            let job = self
                .store
                .start_job(job_id, worker_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Job", job_id))?;
            tracing::info!(job_id, task_id = job.task_id, worker_id, "Job started");
            return Ok(job);
        }

        match self
            .store
            .try_claim_job(job_id, worker_id, self.stale_before())
            .await?
        {
            ClaimOutcome::Claimed(job) => {
                tracing::info!(job_id, task_id = job.task_id, worker_id, "Job claimed");
                Ok(job)
            }
            ClaimOutcome::Lost(status_id) => {
                let status = JobStatus::from_id(status_id).map_or("unknown", JobStatus::name);
                tracing::info!(job_id, worker_id, status, "Claim lost");
                Err(CoreError::Conflict(format!("Job {job_id} is already {status}")).into())
            }
            ClaimOutcome::NotFound => Err(CoreError::not_found("Job", job_id).into()),
        }
    }

    /// Store a job's rendered pixels and mark it completed.
    ///
    /// Re-completing a job replaces the earlier result.
    pub async fn complete_job(&self, job_id: DbId, result: &[u8]) -> AppResult<Job> {
        let job = self
            .store
            .complete_job(job_id, result)
            .await?
            .ok_or_else(|| CoreError::not_found("Job", job_id))?;

        if tilefarm_core::aggregation::expected_len(&job.rect()) != Some(result.len()) {
            tracing::warn!(
                job_id,
                task_id = job.task_id,
                bytes = result.len(),
                "Result size does not match tile; it will be skipped when assembling",
            );
        }
        tracing::info!(job_id, task_id = job.task_id, bytes = result.len(), "Job completed");
        Ok(job)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Attach the task with signed locators. Signing failures fall back to
    /// the stored locator.
    async fn dispatch(&self, job: Job, mut task: Task) -> DispatchedJob {
        for locator in [
            &mut task.scene_mesh_url,
            &mut task.scene_bvh_url,
            &mut task.scene_textures_url,
        ] {
            if locator.is_empty() {
                continue;
            }
            match self.signer.sign(locator.as_str()).await {
                Ok(signed) => *locator = signed,
                Err(e) => {
                    tracing::warn!(job_id = job.id, error = %e, "Failed to sign scene locator");
                }
            }
        }
        DispatchedJob { job, task }
    }
}
