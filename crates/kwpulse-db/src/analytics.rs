//! Database operations for the `keyword_analytics` table.

use chrono::{DateTime, Utc};
use kwpulse_core::{AnalyticsPeriod, PeriodKey, PeriodMetrics};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `keyword_analytics` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalyticsRow {
    pub id: i64,
    pub keyword_id: i64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub period_type: String,
    pub total_engagement: i64,
    pub social_results: i32,
    pub place_results: i32,
    pub average_rating: Option<Decimal>,
    pub total_jobs: i32,
    pub completed_jobs: i32,
    pub failed_jobs: i32,
    pub total_results: i64,
    pub success_rate: Decimal,
    pub owner_id: Uuid,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub computed_at: DateTime<Utc>,
}

impl TryFrom<AnalyticsRow> for AnalyticsPeriod {
    type Error = DbError;

    fn try_from(row: AnalyticsRow) -> Result<Self, Self::Error> {
        Ok(AnalyticsPeriod {
            id: row.id,
            key: PeriodKey {
                keyword_id: row.keyword_id,
                period_start: row.period_start,
                period_end: row.period_end,
                period_type: row
                    .period_type
                    .parse()
                    .map_err(|e| DbError::decode("period_type", e))?,
            },
            metrics: PeriodMetrics {
                total_engagement: row.total_engagement,
                social_results: row.social_results,
                place_results: row.place_results,
                average_rating: row.average_rating,
                total_jobs: row.total_jobs,
                completed_jobs: row.completed_jobs,
                failed_jobs: row.failed_jobs,
                total_results: row.total_results,
                success_rate: row.success_rate,
            },
            owner_id: row.owner_id,
            created_by: row.created_by,
            updated_by: row.updated_by,
            computed_at: row.computed_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Inserts or replaces the analytics row for `key`.
///
/// Conflicts on `(keyword_id, period_start, period_end, period_type)` replace
/// every counter in place; `created_by` keeps its first value and the caller
/// is recorded as `updated_by`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_keyword_analytics(
    pool: &PgPool,
    key: &PeriodKey,
    metrics: &PeriodMetrics,
    owner_id: Uuid,
    actor: Option<Uuid>,
    computed_at: DateTime<Utc>,
) -> Result<AnalyticsRow, DbError> {
    let row = sqlx::query_as::<_, AnalyticsRow>(
        "INSERT INTO keyword_analytics \
             (keyword_id, period_start, period_end, period_type, total_engagement, \
              social_results, place_results, average_rating, total_jobs, completed_jobs, \
              failed_jobs, total_results, success_rate, owner_id, created_by, updated_by, \
              computed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15, $16) \
         ON CONFLICT ON CONSTRAINT keyword_analytics_period_key DO UPDATE SET \
             total_engagement = EXCLUDED.total_engagement, \
             social_results   = EXCLUDED.social_results, \
             place_results    = EXCLUDED.place_results, \
             average_rating   = EXCLUDED.average_rating, \
             total_jobs       = EXCLUDED.total_jobs, \
             completed_jobs   = EXCLUDED.completed_jobs, \
             failed_jobs      = EXCLUDED.failed_jobs, \
             total_results    = EXCLUDED.total_results, \
             success_rate     = EXCLUDED.success_rate, \
             owner_id         = EXCLUDED.owner_id, \
             updated_by       = EXCLUDED.updated_by, \
             computed_at      = EXCLUDED.computed_at \
         RETURNING id, keyword_id, period_start, period_end, period_type, total_engagement, \
                   social_results, place_results, average_rating, total_jobs, \
                   completed_jobs, failed_jobs, total_results, success_rate, owner_id, \
                   created_by, updated_by, computed_at",
    )
    .bind(key.keyword_id)
    .bind(key.period_start)
    .bind(key.period_end)
    .bind(key.period_type.as_str())
    .bind(metrics.total_engagement)
    .bind(metrics.social_results)
    .bind(metrics.place_results)
    .bind(metrics.average_rating)
    .bind(metrics.total_jobs)
    .bind(metrics.completed_jobs)
    .bind(metrics.failed_jobs)
    .bind(metrics.total_results)
    .bind(metrics.success_rate)
    .bind(owner_id)
    .bind(actor)
    .bind(computed_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches the analytics row for `key`, if one has been computed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_keyword_analytics(
    pool: &PgPool,
    key: &PeriodKey,
) -> Result<Option<AnalyticsRow>, DbError> {
    let row = sqlx::query_as::<_, AnalyticsRow>(
        "SELECT id, keyword_id, period_start, period_end, period_type, total_engagement, \
                social_results, place_results, average_rating, total_jobs, completed_jobs, \
                failed_jobs, total_results, success_rate, owner_id, created_by, updated_by, \
                computed_at \
         FROM keyword_analytics \
         WHERE keyword_id = $1 AND period_start = $2 AND period_end = $3 AND period_type = $4",
    )
    .bind(key.keyword_id)
    .bind(key.period_start)
    .bind(key.period_end)
    .bind(key.period_type.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns daily rows with `period_start` in `[start, end)` across all live
/// keywords, ordered by keyword then period.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_daily_analytics_between(
    pool: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<AnalyticsRow>, DbError> {
    let rows = sqlx::query_as::<_, AnalyticsRow>(
        "SELECT a.id, a.keyword_id, a.period_start, a.period_end, a.period_type, \
                a.total_engagement, a.social_results, a.place_results, a.average_rating, \
                a.total_jobs, a.completed_jobs, a.failed_jobs, a.total_results, \
                a.success_rate, a.owner_id, a.created_by, a.updated_by, a.computed_at \
         FROM keyword_analytics a \
         JOIN keywords k ON k.id = a.keyword_id AND k.deleted_at IS NULL \
         WHERE a.period_type = 'daily' AND a.period_start >= $1 AND a.period_start < $2 \
         ORDER BY a.keyword_id, a.period_start",
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
