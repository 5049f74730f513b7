//! Storage seam for the pipeline.
//!
//! Every component talks to persistence through [`JobStore`] (job records,
//! keywords, assignments, operation counts) and [`AnalyticsStore`] (analytics
//! periods and derived datasets). [`PgStore`] backs them with Postgres;
//! [`MemoryStore`] keeps everything in process for tests and dry runs.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kwpulse_core::{
    AnalyticsPeriod, CategoryRollup, Job, JobStatus, Keyword, KeywordAssignment, NewJob,
    OperationType, PeriodKey, PeriodMetrics, Priority, TrendRecord,
};
use kwpulse_db::DbError;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Job records plus the keyword and assignment data the pipeline reads.
///
/// All reads exclude soft-deleted rows.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new `pending` job stamped with `now`.
    async fn insert_job(&self, job: NewJob, now: DateTime<Utc>) -> Result<Job, StoreError>;

    async fn get_job(&self, id: i64) -> Result<Option<Job>, StoreError>;

    /// Writes the mutable fields of `job` only if the stored status still
    /// equals `expected` and the lease is still held by `expected_lease`
    /// (`None` meaning unleased). Returns `false` when the guard did not match.
    async fn update_job_if_status(
        &self,
        job: &Job,
        expected: JobStatus,
        expected_lease: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Up to `limit` pending jobs in dequeue order: priority descending, then
    /// oldest first, then lowest id.
    async fn pending_candidates(&self, limit: u32) -> Result<Vec<Job>, StoreError>;

    /// Atomically moves job `id` from `pending` to `queued` under a lease.
    ///
    /// Never waits on a competing claim: a job another caller is claiming or
    /// has already claimed yields `Ok(None)`.
    async fn try_claim(
        &self,
        id: i64,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError>;

    /// Returns every `queued` job whose lease expired before `now` to `pending`.
    async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn soft_delete_job(
        &self,
        id: i64,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Failed jobs that still have retry budget, oldest failure first.
    async fn retryable_failed_jobs(&self, limit: u32) -> Result<Vec<Job>, StoreError>;

    /// Jobs for `keyword_id` created inside `[start, end]`.
    async fn jobs_for_keyword_between(
        &self,
        keyword_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError>;

    async fn get_keyword(&self, id: i64) -> Result<Option<Keyword>, StoreError>;

    async fn active_keywords(&self) -> Result<Vec<Keyword>, StoreError>;

    /// Sets a keyword's priority. Returns `false` if it already had that value.
    async fn set_keyword_priority(
        &self,
        keyword_id: i64,
        priority: Priority,
    ) -> Result<bool, StoreError>;

    /// Assignments for `keyword_id` created inside `[start, end]`.
    async fn assignments_for_keyword_between(
        &self,
        keyword_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<KeywordAssignment>, StoreError>;

    /// How many `operation`s `caller` performed at or after `since`.
    async fn count_operations_since(
        &self,
        caller: Uuid,
        operation: &OperationType,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Logs one `operation` for `caller`. Job creation and assignment inserts
    /// are counted from their own tables and need no explicit record.
    async fn record_operation(
        &self,
        caller: Uuid,
        operation: &OperationType,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Analytics periods and the derived datasets built from them.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Inserts or replaces the period identified by `key`. The original
    /// `created_by` survives a replace.
    async fn upsert_period(
        &self,
        key: &PeriodKey,
        metrics: &PeriodMetrics,
        owner_id: Uuid,
        actor: Option<Uuid>,
        computed_at: DateTime<Utc>,
    ) -> Result<AnalyticsPeriod, StoreError>;

    async fn get_period(&self, key: &PeriodKey) -> Result<Option<AnalyticsPeriod>, StoreError>;

    /// Daily periods with `period_start` in `[start, end)` for live keywords.
    async fn daily_periods_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsPeriod>, StoreError>;

    /// Swaps the whole trend dataset for `records`. Readers never observe a
    /// partially written dataset.
    async fn replace_trends(&self, records: Vec<TrendRecord>) -> Result<u64, StoreError>;

    /// Trend records ordered by score, highest first.
    async fn trends(&self, limit: u32) -> Result<Vec<TrendRecord>, StoreError>;

    /// Recomputes the per-category rollups and returns their row count.
    async fn refresh_category_rollups(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Rollups from the last refresh for `owner_id`, ordered by category.
    async fn rollups_for_owner(&self, owner_id: Uuid) -> Result<Vec<CategoryRollup>, StoreError>;
}

/// Shorthand for a backend that implements both store traits.
pub trait Store: JobStore + AnalyticsStore {}

impl<T: JobStore + AnalyticsStore> Store for T {}
