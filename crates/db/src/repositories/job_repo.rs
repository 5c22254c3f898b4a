//! Repository for the `jobs` table.
//!
//! Uses `JobStatus` from `models::status` for every status literal.
//!
//! Two claim flavours exist. [`JobRepo::start`] is the base protocol's
//! unconditional write: it succeeds on any existing job and overwrites the
//! previous assignment. [`JobRepo::try_claim`] and [`JobRepo::claim_next`]
//! are conditional single-row updates, so at most one caller moves a job
//! out of `created`.

use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tilefarm_core::tiling::TileRect;
use tilefarm_core::types::{DbId, Timestamp};

use crate::models::job::Job;
use crate::models::status::{JobStatus, StatusId};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, task_id, x, y, width, height, status_id, assigned_worker_id, \
    created_at, started_at, completed_at, result_data";

/// Postgres caps a single statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// Bind parameters used per job row by [`JobRepo::insert_batch`].
const BINDS_PER_JOB: usize = 6;

/// Eligibility predicate shared by the dispatch and claim queries.
///
/// `$created` and `$started` are status ids; `$stale` is the recovery
/// cutoff and may be NULL, in which case only created jobs qualify.
fn eligible_clause(created: u8, started: u8, stale: u8) -> String {
    format!(
        "(status_id = ${created} OR (status_id = ${started} AND started_at < ${stale}))"
    )
}

/// Provides queue operations for tile jobs.
pub struct JobRepo;

impl JobRepo {
    /// Clamp a requested batch size into `1..=MAX_BIND_PARAMS / BINDS_PER_JOB`.
    pub fn clamp_batch_size(requested: usize) -> usize {
        requested.clamp(1, MAX_BIND_PARAMS / BINDS_PER_JOB)
    }

    /// Bulk-insert one batch of `created` jobs inside an open transaction.
    pub async fn insert_batch(
        tx: &mut Transaction<'_, Postgres>,
        task_id: DbId,
        tiles: &[TileRect],
    ) -> Result<(), sqlx::Error> {
        if tiles.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO jobs (task_id, x, y, width, height, status_id) ");
        builder.push_values(tiles, |mut row, tile| {
            row.push_bind(task_id)
                .push_bind(tile.x)
                .push_bind(tile.y)
                .push_bind(tile.width)
                .push_bind(tile.height)
                .push_bind(JobStatus::Created.id());
        });
        builder.build().execute(&mut **tx).await?;
        Ok(())
    }

    /// Select the next dispatchable job of a task in raster order.
    ///
    /// This is a plain read: two concurrent callers may receive the same
    /// job. With `stale_before` set, `started` jobs claimed before that
    /// instant are eligible again.
    pub async fn next_for_task(
        pool: &PgPool,
        task_id: DbId,
        stale_before: Option<Timestamp>,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE task_id = $1 AND {} \
             ORDER BY y, x \
             LIMIT 1",
            eligible_clause(2, 3, 4),
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(task_id)
            .bind(JobStatus::Created.id())
            .bind(JobStatus::Started.id())
            .bind(stale_before)
            .fetch_optional(pool)
            .await
    }

    /// Mark a job `started` unconditionally, recording the worker.
    ///
    /// Succeeds regardless of the current status. Returns `None` only when
    /// the job does not exist.
    pub async fn start(
        pool: &PgPool,
        job_id: DbId,
        worker_id: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, assigned_worker_id = $3, started_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(JobStatus::Started.id())
            .bind(worker_id)
            .fetch_optional(pool)
            .await
    }

    /// Check-and-set claim of one job.
    ///
    /// The status test and the write happen in one UPDATE on one row, so
    /// of two concurrent callers only one gets the row back.
    pub async fn try_claim(
        pool: &PgPool,
        job_id: DbId,
        worker_id: &str,
        stale_before: Option<Timestamp>,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $3, assigned_worker_id = $2, started_at = NOW() \
             WHERE id = $1 AND {} \
             RETURNING {COLUMNS}",
            eligible_clause(4, 3, 5),
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(worker_id)
            .bind(JobStatus::Started.id())
            .bind(JobStatus::Created.id())
            .bind(stale_before)
            .fetch_optional(pool)
            .await
    }

    /// Atomically select and claim the lowest raster-ordered eligible job.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent claimers never
    /// receive the same job.
    pub async fn claim_next(
        pool: &PgPool,
        task_id: DbId,
        worker_id: &str,
        stale_before: Option<Timestamp>,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $3, assigned_worker_id = $2, started_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE task_id = $1 AND {} \
                 ORDER BY y, x \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}",
            eligible_clause(4, 3, 5),
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(task_id)
            .bind(worker_id)
            .bind(JobStatus::Started.id())
            .bind(JobStatus::Created.id())
            .bind(stale_before)
            .fetch_optional(pool)
            .await
    }

    /// Store a job's result and mark it completed.
    ///
    /// Unconditional: re-submitting overwrites the earlier result, which
    /// tolerates workers that re-render after a network partition.
    pub async fn complete(
        pool: &PgPool,
        job_id: DbId,
        result: &[u8],
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, result_data = $3, completed_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(JobStatus::Completed.id())
            .bind(result)
            .fetch_optional(pool)
            .await
    }

    /// Current status of a job, if it exists.
    pub async fn status_of(pool: &PgPool, job_id: DbId) -> Result<Option<StatusId>, sqlx::Error> {
        sqlx::query_scalar::<_, StatusId>("SELECT status_id FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All jobs of a task in raster order, result payloads included.
    pub async fn list_by_task(pool: &PgPool, task_id: DbId) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE task_id = $1 ORDER BY y, x");
        sqlx::query_as::<_, Job>(&query)
            .bind(task_id)
            .fetch_all(pool)
            .await
    }
}
