//! Database operations for the `scraping_jobs` table.
//!
//! Every read filters `deleted_at IS NULL`; soft-deleted jobs are invisible
//! to callers of this module, including the dequeue path.

use chrono::{DateTime, Utc};
use kwpulse_core::{Job, JobStatus, NewJob, Priority};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

macro_rules! job_columns {
    () => {
        "id, public_id, keyword_id, job_type, priority, status, results_count, \
         expected_results, started_at, completed_at, estimated_duration_secs, \
         actual_duration_secs, error_message, error_code, retry_count, max_retries, \
         job_config, job_results, owner_id, created_by, updated_by, leased_by, \
         lease_expires_at, created_at, updated_at, deleted_at"
    };
}

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `scraping_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: i64,
    pub public_id: Uuid,
    pub keyword_id: i64,
    pub job_type: String,
    pub priority: i16,
    pub status: String,
    pub results_count: i32,
    pub expected_results: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_duration_secs: Option<i64>,
    pub actual_duration_secs: Option<i64>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub job_config: Value,
    pub job_results: Option<Value>,
    pub owner_id: Uuid,
    pub created_by: Uuid,
    pub updated_by: Option<Uuid>,
    pub leased_by: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            public_id: row.public_id,
            keyword_id: row.keyword_id,
            job_type: row
                .job_type
                .parse()
                .map_err(|e| DbError::decode("job_type", e))?,
            priority: Priority::new(i64::from(row.priority))
                .map_err(|e| DbError::decode("priority", e))?,
            status: row
                .status
                .parse()
                .map_err(|e| DbError::decode("status", e))?,
            results_count: row.results_count,
            expected_results: row.expected_results,
            started_at: row.started_at,
            completed_at: row.completed_at,
            estimated_duration_secs: row.estimated_duration_secs,
            actual_duration_secs: row.actual_duration_secs,
            error_message: row.error_message,
            error_code: row.error_code,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            job_config: row.job_config,
            job_results: row.job_results,
            owner_id: row.owner_id,
            created_by: row.created_by,
            updated_by: row.updated_by,
            leased_by: row.leased_by,
            lease_expires_at: row.lease_expires_at,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Inserts a new job in `pending` status and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including CHECK violations
/// on priority or retry budget).
pub async fn insert_job(
    pool: &PgPool,
    job: &NewJob,
    now: DateTime<Utc>,
) -> Result<JobRow, DbError> {
    let row = sqlx::query_as::<_, JobRow>(concat!(
        "INSERT INTO scraping_jobs \
             (public_id, keyword_id, job_type, priority, status, expected_results, \
              estimated_duration_secs, max_retries, job_config, owner_id, created_by, \
              created_at, updated_at) \
         VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8, $9, $10, $11, $11) \
         RETURNING ",
        job_columns!()
    ))
    .bind(Uuid::new_v4())
    .bind(job.keyword_id)
    .bind(job.job_type.as_str())
    .bind(i16::from(job.priority))
    .bind(job.expected_results)
    .bind(job.estimated_duration_secs)
    .bind(job.max_retries)
    .bind(&job.job_config)
    .bind(job.owner_id)
    .bind(job.created_by)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Writes the mutable fields of `job` if the stored row is still in
/// `expected` status and leased to `expected_lease`.
///
/// Returns `false` when the row is missing, soft-deleted, or has moved to a
/// different status or lease holder since it was read.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_job_if_status(
    pool: &PgPool,
    job: &Job,
    expected: JobStatus,
    expected_lease: Option<&str>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE scraping_jobs SET \
             status = $2, results_count = $3, started_at = $4, completed_at = $5, \
             actual_duration_secs = $6, error_message = $7, error_code = $8, \
             job_results = $9, retry_count = $10, leased_by = $11, lease_expires_at = $12, \
             updated_by = $13, updated_at = $14 \
         WHERE id = $1 AND status = $15 AND leased_by IS NOT DISTINCT FROM $16 \
           AND deleted_at IS NULL",
    )
    .bind(job.id)
    .bind(job.status.as_str())
    .bind(job.results_count)
    .bind(job.started_at)
    .bind(job.completed_at)
    .bind(job.actual_duration_secs)
    .bind(job.error_message.as_deref())
    .bind(job.error_code.as_deref())
    .bind(job.job_results.as_ref())
    .bind(job.retry_count)
    .bind(job.leased_by.as_deref())
    .bind(job.lease_expires_at)
    .bind(job.updated_by)
    .bind(job.updated_at)
    .bind(expected.as_str())
    .bind(expected_lease)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Atomically moves job `id` from `pending` to `queued` and records the lease.
///
/// The inner `FOR UPDATE SKIP LOCKED` makes the claim non-blocking: if another
/// transaction holds the row, this returns `None` immediately instead of
/// waiting. `None` is also returned when the job is no longer pending.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_pending_job(
    pool: &PgPool,
    id: i64,
    worker_id: &str,
    lease_expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<JobRow>, DbError> {
    let row = sqlx::query_as::<_, JobRow>(concat!(
        "UPDATE scraping_jobs \
         SET status = 'queued', leased_by = $2, lease_expires_at = $3, updated_at = $4 \
         WHERE id = ( \
             SELECT id FROM scraping_jobs \
             WHERE id = $1 AND status = 'pending' AND deleted_at IS NULL \
             FOR UPDATE SKIP LOCKED \
         ) \
         RETURNING ",
        job_columns!()
    ))
    .bind(id)
    .bind(worker_id)
    .bind(lease_expires_at)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns `queued` jobs whose lease expired before `now` to `pending`.
///
/// Rows locked by a concurrent claim or update are skipped and picked up on
/// the next sweep.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn reclaim_expired_leases(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE scraping_jobs \
         SET status = 'pending', leased_by = NULL, lease_expires_at = NULL, updated_at = $1 \
         WHERE id IN ( \
             SELECT id FROM scraping_jobs \
             WHERE status = 'queued' AND deleted_at IS NULL AND lease_expires_at < $1 \
             FOR UPDATE SKIP LOCKED \
         )",
    )
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Sets `deleted_at` on a live job. Returns `false` if no live job matched.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn soft_delete_job(
    pool: &PgPool,
    id: i64,
    actor: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE scraping_jobs \
         SET deleted_at = $3, updated_by = $2, updated_at = $3, \
             leased_by = NULL, lease_expires_at = NULL \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .bind(actor)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetches a live job by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_job(pool: &PgPool, id: i64) -> Result<Option<JobRow>, DbError> {
    let row = sqlx::query_as::<_, JobRow>(concat!(
        "SELECT ",
        job_columns!(),
        " FROM scraping_jobs WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns up to `limit` pending jobs in dequeue order: highest priority
/// first, then oldest `created_at`, then lowest id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pending_candidates(pool: &PgPool, limit: i64) -> Result<Vec<JobRow>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(concat!(
        "SELECT ",
        job_columns!(),
        " FROM scraping_jobs \
          WHERE status = 'pending' AND deleted_at IS NULL \
          ORDER BY priority DESC, created_at ASC, id ASC \
          LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns failed jobs that still have retry budget, oldest failure first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_retryable_failed_jobs(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<JobRow>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(concat!(
        "SELECT ",
        job_columns!(),
        " FROM scraping_jobs \
          WHERE status = 'failed' AND retry_count < max_retries AND deleted_at IS NULL \
          ORDER BY completed_at ASC, id ASC \
          LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns jobs for `keyword_id` created inside `[start, end]`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_jobs_for_keyword_between(
    pool: &PgPool,
    keyword_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<JobRow>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(concat!(
        "SELECT ",
        job_columns!(),
        " FROM scraping_jobs \
          WHERE keyword_id = $1 AND created_at >= $2 AND created_at <= $3 \
            AND deleted_at IS NULL \
          ORDER BY id"
    ))
    .bind(keyword_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Counts jobs created by `caller` at or after `since`, soft-deleted ones
/// included: deleting a job does not hand back quota.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_jobs_created_since(
    pool: &PgPool,
    caller: Uuid,
    since: DateTime<Utc>,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM scraping_jobs WHERE created_by = $1 AND created_at >= $2",
    )
    .bind(caller)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
