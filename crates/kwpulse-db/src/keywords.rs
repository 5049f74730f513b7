//! Database operations for the `keywords` table.

use chrono::{DateTime, Utc};
use kwpulse_core::{Keyword, Priority};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `keywords` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KeywordRow {
    pub id: i64,
    pub public_id: Uuid,
    pub owner_id: Uuid,
    pub term: String,
    pub category: Option<String>,
    pub priority: i16,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<KeywordRow> for Keyword {
    type Error = DbError;

    fn try_from(row: KeywordRow) -> Result<Self, Self::Error> {
        Ok(Keyword {
            id: row.id,
            public_id: row.public_id,
            owner_id: row.owner_id,
            term: row.term,
            category: row.category,
            priority: Priority::new(i64::from(row.priority))
                .map_err(|e| DbError::decode("priority", e))?,
            is_active: row.is_active,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Returns a live (non-deleted) keyword by id, active or not.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_keyword(pool: &PgPool, id: i64) -> Result<Option<KeywordRow>, DbError> {
    let row = sqlx::query_as::<_, KeywordRow>(
        "SELECT id, public_id, owner_id, term, category, priority, is_active, \
                created_at, updated_at, deleted_at \
         FROM keywords \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns all active, non-deleted keywords, ordered by id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_keywords(pool: &PgPool) -> Result<Vec<KeywordRow>, DbError> {
    let rows = sqlx::query_as::<_, KeywordRow>(
        "SELECT id, public_id, owner_id, term, category, priority, is_active, \
                created_at, updated_at, deleted_at \
         FROM keywords \
         WHERE is_active = true AND deleted_at IS NULL \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Sets `keywords.priority` when it differs from the stored value.
///
/// Returns `true` if a row was changed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_keyword_priority(
    pool: &PgPool,
    keyword_id: i64,
    priority: Priority,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE keywords \
         SET priority = $2, updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL AND priority <> $2",
    )
    .bind(keyword_id)
    .bind(i16::from(priority))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
