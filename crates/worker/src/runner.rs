//! The worker polling loop.
//!
//! Each iteration asks for the next job, marks it started, renders it and
//! uploads the result. Selection and start are separate calls, so another
//! worker may render the same tile; the later upload overwrites the
//! earlier one.

use std::sync::Arc;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::client::ApiClient;
use crate::config::WorkerConfig;
use crate::render::TileRenderer;

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A job was rendered and uploaded.
    Completed { job_id: i64 },
    /// Nothing claimable right now.
    Idle,
    /// Another worker took the job between selection and start.
    Lost { job_id: i64 },
}

/// Drives the claim protocol for one task.
pub struct Worker {
    client: ApiClient,
    renderer: Arc<dyn TileRenderer>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(client: ApiClient, renderer: Arc<dyn TileRenderer>, config: WorkerConfig) -> Self {
        Self {
            client,
            renderer,
            config,
        }
    }

    /// Run one next -> start -> render -> complete cycle.
    pub async fn step(&self) -> anyhow::Result<Step> {
        let task_id = self.config.task_id;
        let worker_id = self.config.worker_id.as_str();

        let Some(next) = self.client.next_job(task_id).await? else {
            return Ok(Step::Idle);
        };
        let job_id = next.job.id;

        let job = match self.client.start_job(job_id, worker_id).await {
            Ok(job) => job,
            Err(e) if e.is_status(StatusCode::CONFLICT) => {
                tracing::debug!(job_id, worker_id, "Job taken by another worker");
                return Ok(Step::Lost { job_id });
            }
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(job_id, x = job.x, y = job.y, "Rendering tile");

        let pixels = self.renderer.render(&job, &next.task).await?;
        self.client.complete_job(job_id, &pixels).await?;

        tracing::info!(task_id, job_id, worker_id, bytes = pixels.len(), "Tile submitted");
        Ok(Step::Completed { job_id })
    }

    /// Poll until cancelled or until `max_jobs` renders were submitted.
    ///
    /// Errors are logged and retried after the poll interval. Returns the
    /// number of submitted renders.
    pub async fn run(&self, cancel: CancellationToken) -> usize {
        let mut completed = 0usize;
        tracing::info!(
            task_id = self.config.task_id,
            worker_id = %self.config.worker_id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Worker started",
        );

        loop {
            if self.config.max_jobs.is_some_and(|max| completed >= max) {
                tracing::info!(completed, "Job limit reached");
                break;
            }

            let pause = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker shutting down");
                    break;
                }
                step = self.step() => match step {
                    Ok(Step::Completed { .. }) => {
                        completed += 1;
                        false
                    }
                    Ok(Step::Lost { .. }) => false,
                    Ok(Step::Idle) => true,
                    Err(e) => {
                        tracing::error!(error = %e, "Worker cycle failed");
                        true
                    }
                },
            };

            if pause {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Worker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        completed
    }
}
