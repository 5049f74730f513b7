//! Database operations for the `keyword_trends` derived dataset.

use chrono::{DateTime, Utc};
use kwpulse_core::{TrendRecord, WindowSnapshot};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `keyword_trends` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrendRow {
    pub keyword_id: i64,
    pub owner_id: Uuid,
    pub recent_engagement: i64,
    pub recent_total_jobs: i64,
    pub recent_completed_jobs: i64,
    pub previous_engagement: i64,
    pub previous_total_jobs: i64,
    pub previous_completed_jobs: i64,
    pub engagement_delta: f64,
    pub job_success_delta: f64,
    pub trend_score: f64,
    pub computed_at: DateTime<Utc>,
}

impl From<TrendRow> for TrendRecord {
    fn from(row: TrendRow) -> Self {
        TrendRecord {
            keyword_id: row.keyword_id,
            owner_id: row.owner_id,
            recent: WindowSnapshot {
                engagement: row.recent_engagement,
                total_jobs: row.recent_total_jobs,
                completed_jobs: row.recent_completed_jobs,
            },
            previous: WindowSnapshot {
                engagement: row.previous_engagement,
                total_jobs: row.previous_total_jobs,
                completed_jobs: row.previous_completed_jobs,
            },
            engagement_delta: row.engagement_delta,
            job_success_delta: row.job_success_delta,
            trend_score: row.trend_score,
            computed_at: row.computed_at,
        }
    }
}

/// Replaces the whole `keyword_trends` dataset with `records`.
///
/// Runs in one transaction so readers see either the previous dataset or the
/// new one, never a mix. Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; the transaction is
/// rolled back and the previous dataset stays in place.
pub async fn replace_keyword_trends(
    pool: &PgPool,
    records: &[TrendRecord],
) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM keyword_trends")
        .execute(&mut *tx)
        .await?;

    let mut written = 0u64;
    for record in records {
        sqlx::query(
            "INSERT INTO keyword_trends \
                 (keyword_id, owner_id, recent_engagement, recent_total_jobs, \
                  recent_completed_jobs, previous_engagement, previous_total_jobs, \
                  previous_completed_jobs, engagement_delta, job_success_delta, \
                  trend_score, computed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(record.keyword_id)
        .bind(record.owner_id)
        .bind(record.recent.engagement)
        .bind(record.recent.total_jobs)
        .bind(record.recent.completed_jobs)
        .bind(record.previous.engagement)
        .bind(record.previous.total_jobs)
        .bind(record.previous.completed_jobs)
        .bind(record.engagement_delta)
        .bind(record.job_success_delta)
        .bind(record.trend_score)
        .bind(record.computed_at)
        .execute(&mut *tx)
        .await?;
        written += 1;
    }

    tx.commit().await?;
    Ok(written)
}

/// Returns the top `limit` trend rows by score.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_keyword_trends(pool: &PgPool, limit: i64) -> Result<Vec<TrendRow>, DbError> {
    let rows = sqlx::query_as::<_, TrendRow>(
        "SELECT keyword_id, owner_id, recent_engagement, recent_total_jobs, \
                recent_completed_jobs, previous_engagement, previous_total_jobs, \
                previous_completed_jobs, engagement_delta, job_success_delta, \
                trend_score, computed_at \
         FROM keyword_trends \
         ORDER BY trend_score DESC, keyword_id ASC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
