//! Database operations for the `keyword_assignments` table.

use chrono::{DateTime, Utc};
use kwpulse_core::KeywordAssignment;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `keyword_assignments` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssignmentRow {
    pub id: i64,
    pub keyword_id: i64,
    pub target_kind: String,
    pub engagement: i64,
    pub rating: Option<Decimal>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<AssignmentRow> for KeywordAssignment {
    type Error = DbError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(KeywordAssignment {
            id: row.id,
            keyword_id: row.keyword_id,
            target_kind: row
                .target_kind
                .parse()
                .map_err(|e| DbError::decode("target_kind", e))?,
            engagement: row.engagement,
            rating: row.rating,
            created_by: row.created_by,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
        })
    }
}

/// Returns live assignments for `keyword_id` created inside `[start, end]`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_assignments_for_keyword_between(
    pool: &PgPool,
    keyword_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<AssignmentRow>, DbError> {
    let rows = sqlx::query_as::<_, AssignmentRow>(
        "SELECT id, keyword_id, target_kind, engagement, rating, created_by, \
                created_at, deleted_at \
         FROM keyword_assignments \
         WHERE keyword_id = $1 AND created_at >= $2 AND created_at <= $3 \
           AND deleted_at IS NULL \
         ORDER BY id",
    )
    .bind(keyword_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Counts assignments created by `caller` at or after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_assignments_created_since(
    pool: &PgPool,
    caller: Uuid,
    since: DateTime<Utc>,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM keyword_assignments WHERE created_by = $1 AND created_at >= $2",
    )
    .bind(caller)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
