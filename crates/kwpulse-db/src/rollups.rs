//! The `keyword_category_rollups` materialized view.

use kwpulse_core::CategoryRollup;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRollupRow {
    pub owner_id: Uuid,
    pub category: String,
    pub keyword_count: i64,
    pub total_engagement: i64,
    pub total_jobs: i64,
    pub completed_jobs: i64,
}

impl From<CategoryRollupRow> for CategoryRollup {
    fn from(row: CategoryRollupRow) -> Self {
        CategoryRollup {
            owner_id: row.owner_id,
            category: row.category,
            keyword_count: row.keyword_count,
            total_engagement: row.total_engagement,
            total_jobs: row.total_jobs,
            completed_jobs: row.completed_jobs,
        }
    }
}

/// Refreshes the view without blocking readers and returns its row count.
///
/// Postgres serializes concurrent `REFRESH ... CONCURRENTLY` calls on the
/// same view, so overlapping refreshes queue rather than corrupt it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the refresh or count fails.
pub async fn refresh_category_rollups(pool: &PgPool) -> Result<u64, DbError> {
    sqlx::query("REFRESH MATERIALIZED VIEW CONCURRENTLY keyword_category_rollups")
        .execute(pool)
        .await?;

    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM keyword_category_rollups")
        .fetch_one(pool)
        .await?;

    Ok(u64::try_from(count).unwrap_or(0))
}

/// Lists rollups for one owner, ordered by category.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_category_rollups(
    pool: &PgPool,
    owner_id: Uuid,
) -> Result<Vec<CategoryRollupRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRollupRow>(
        "SELECT owner_id, category, keyword_count, total_engagement, total_jobs, completed_jobs \
         FROM keyword_category_rollups \
         WHERE owner_id = $1 \
         ORDER BY category",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
