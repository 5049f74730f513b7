use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kwpulse_core::{
    AnalyticsPeriod, CategoryRollup, Job, JobStatus, Keyword, KeywordAssignment, NewJob,
    OperationType, PeriodKey, PeriodMetrics, Priority, TrendRecord,
};
use kwpulse_db::DbError;
use sqlx::PgPool;
use uuid::Uuid;

use super::{AnalyticsStore, JobStore, StoreError};

/// Postgres-backed store over the `kwpulse-db` query functions.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter()
        .map(|row| T::try_from(row).map_err(StoreError::from))
        .collect()
}

fn convert_opt<R, T>(row: Option<R>) -> Result<Option<T>, StoreError>
where
    T: TryFrom<R, Error = DbError>,
{
    row.map(T::try_from).transpose().map_err(StoreError::from)
}

fn non_negative(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

#[async_trait]
impl JobStore for PgStore {
    async fn insert_job(&self, job: NewJob, now: DateTime<Utc>) -> Result<Job, StoreError> {
        let row = kwpulse_db::insert_job(&self.pool, &job, now).await?;
        Ok(Job::try_from(row)?)
    }

    async fn get_job(&self, id: i64) -> Result<Option<Job>, StoreError> {
        convert_opt(kwpulse_db::get_job(&self.pool, id).await?)
    }

    async fn update_job_if_status(
        &self,
        job: &Job,
        expected: JobStatus,
        expected_lease: Option<&str>,
    ) -> Result<bool, StoreError> {
        Ok(kwpulse_db::update_job_if_status(&self.pool, job, expected, expected_lease).await?)
    }

    async fn pending_candidates(&self, limit: u32) -> Result<Vec<Job>, StoreError> {
        convert_all(kwpulse_db::list_pending_candidates(&self.pool, i64::from(limit)).await?)
    }

    async fn try_claim(
        &self,
        id: i64,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let row =
            kwpulse_db::claim_pending_job(&self.pool, id, worker_id, lease_expires_at, now)
                .await?;
        convert_opt(row)
    }

    async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(kwpulse_db::reclaim_expired_leases(&self.pool, now).await?)
    }

    async fn soft_delete_job(
        &self,
        id: i64,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(kwpulse_db::soft_delete_job(&self.pool, id, actor, now).await?)
    }

    async fn retryable_failed_jobs(&self, limit: u32) -> Result<Vec<Job>, StoreError> {
        convert_all(kwpulse_db::list_retryable_failed_jobs(&self.pool, i64::from(limit)).await?)
    }

    async fn jobs_for_keyword_between(
        &self,
        keyword_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError> {
        convert_all(
            kwpulse_db::list_jobs_for_keyword_between(&self.pool, keyword_id, start, end).await?,
        )
    }

    async fn get_keyword(&self, id: i64) -> Result<Option<Keyword>, StoreError> {
        convert_opt(kwpulse_db::get_keyword(&self.pool, id).await?)
    }

    async fn active_keywords(&self) -> Result<Vec<Keyword>, StoreError> {
        convert_all(kwpulse_db::list_active_keywords(&self.pool).await?)
    }

    async fn set_keyword_priority(
        &self,
        keyword_id: i64,
        priority: Priority,
    ) -> Result<bool, StoreError> {
        Ok(kwpulse_db::update_keyword_priority(&self.pool, keyword_id, priority).await?)
    }

    async fn assignments_for_keyword_between(
        &self,
        keyword_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<KeywordAssignment>, StoreError> {
        convert_all(
            kwpulse_db::list_assignments_for_keyword_between(&self.pool, keyword_id, start, end)
                .await?,
        )
    }

    async fn count_operations_since(
        &self,
        caller: Uuid,
        operation: &OperationType,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count = match operation {
            OperationType::ScrapingJob => {
                kwpulse_db::count_jobs_created_since(&self.pool, caller, since).await?
            }
            OperationType::BulkAssignment => {
                kwpulse_db::count_assignments_created_since(&self.pool, caller, since).await?
            }
            OperationType::Other(name) => {
                kwpulse_db::count_operations_since(&self.pool, caller, name, since).await?
            }
        };
        Ok(non_negative(count))
    }

    async fn record_operation(
        &self,
        caller: Uuid,
        operation: &OperationType,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match operation {
            OperationType::ScrapingJob | OperationType::BulkAssignment => Ok(()),
            OperationType::Other(name) => {
                Ok(kwpulse_db::record_operation(&self.pool, caller, name, at).await?)
            }
        }
    }
}

#[async_trait]
impl AnalyticsStore for PgStore {
    async fn upsert_period(
        &self,
        key: &PeriodKey,
        metrics: &PeriodMetrics,
        owner_id: Uuid,
        actor: Option<Uuid>,
        computed_at: DateTime<Utc>,
    ) -> Result<AnalyticsPeriod, StoreError> {
        let row = kwpulse_db::upsert_keyword_analytics(
            &self.pool,
            key,
            metrics,
            owner_id,
            actor,
            computed_at,
        )
        .await?;
        Ok(AnalyticsPeriod::try_from(row)?)
    }

    async fn get_period(&self, key: &PeriodKey) -> Result<Option<AnalyticsPeriod>, StoreError> {
        convert_opt(kwpulse_db::get_keyword_analytics(&self.pool, key).await?)
    }

    async fn daily_periods_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsPeriod>, StoreError> {
        convert_all(kwpulse_db::list_daily_analytics_between(&self.pool, start, end).await?)
    }

    async fn replace_trends(&self, records: Vec<TrendRecord>) -> Result<u64, StoreError> {
        Ok(kwpulse_db::replace_keyword_trends(&self.pool, &records).await?)
    }

    async fn trends(&self, limit: u32) -> Result<Vec<TrendRecord>, StoreError> {
        let rows = kwpulse_db::list_keyword_trends(&self.pool, i64::from(limit)).await?;
        Ok(rows.into_iter().map(TrendRecord::from).collect())
    }

    async fn refresh_category_rollups(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
        // The view derives its 30-day window from NOW() at refresh time.
        Ok(kwpulse_db::refresh_category_rollups(&self.pool).await?)
    }

    async fn rollups_for_owner(&self, owner_id: Uuid) -> Result<Vec<CategoryRollup>, StoreError> {
        let rows = kwpulse_db::list_category_rollups(&self.pool, owner_id).await?;
        Ok(rows.into_iter().map(CategoryRollup::from).collect())
    }
}
