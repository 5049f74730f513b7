//! Database operations for the `operation_log` rate-limit ledger.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Appends one operation for `caller`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn record_operation(
    pool: &PgPool,
    caller: Uuid,
    operation_type: &str,
    at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO operation_log (caller_id, operation_type, created_at) \
         VALUES ($1, $2, $3)",
    )
    .bind(caller)
    .bind(operation_type)
    .bind(at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Counts logged operations of `operation_type` by `caller` at or after `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_operations_since(
    pool: &PgPool,
    caller: Uuid,
    operation_type: &str,
    since: DateTime<Utc>,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM operation_log \
         WHERE caller_id = $1 AND operation_type = $2 AND created_at >= $3",
    )
    .bind(caller)
    .bind(operation_type)
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
