//! Live integration tests for kwpulse-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. They need `DATABASE_URL` pointing at a server the
//! harness can create databases on, so they are ignored by default:
//! `cargo test -p kwpulse-db -- --ignored`.

use chrono::{Duration, Utc};
use kwpulse_core::{
    JobStatus, JobType, NewJob, PeriodKey, PeriodMetrics, PeriodType, Priority, TrendRecord,
    WindowSnapshot,
};
use kwpulse_db::{
    claim_pending_job, count_jobs_created_since, count_operations_since, get_job,
    get_keyword_analytics, insert_job, list_category_rollups, list_keyword_trends,
    list_pending_candidates, reclaim_expired_leases, record_operation, refresh_category_rollups,
    replace_keyword_trends, soft_delete_job, update_job_if_status, upsert_keyword_analytics,
};
use rust_decimal::Decimal;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn insert_test_keyword(pool: &sqlx::PgPool, owner: Uuid, term: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO keywords (public_id, owner_id, term) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(owner)
    .bind(term)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("insert_test_keyword failed for '{term}': {e}"))
}

async fn insert_categorized_keyword(
    pool: &sqlx::PgPool,
    owner: Uuid,
    term: &str,
    category: &str,
) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO keywords (public_id, owner_id, term, category) \
         VALUES ($1, $2, $3, $4) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(owner)
    .bind(term)
    .bind(category)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("insert_categorized_keyword failed for '{term}': {e}"))
}

async fn put_daily(pool: &sqlx::PgPool, keyword_id: i64, owner: Uuid, days_ago: i64, engagement: i64) {
    let date = (Utc::now() - Duration::days(days_ago)).date_naive();
    let (start, end) = PeriodType::Daily.bounds_containing(date);
    let key = PeriodKey {
        keyword_id,
        period_start: start,
        period_end: end,
        period_type: PeriodType::Daily,
    };
    let metrics = PeriodMetrics {
        total_engagement: engagement,
        total_jobs: 1,
        completed_jobs: 1,
        ..PeriodMetrics::default()
    };
    upsert_keyword_analytics(pool, &key, &metrics, owner, None, Utc::now())
        .await
        .unwrap();
}

fn trend(keyword_id: i64, owner: Uuid, score: f64) -> TrendRecord {
    TrendRecord {
        keyword_id,
        owner_id: owner,
        recent: WindowSnapshot {
            engagement: 10,
            total_jobs: 1,
            completed_jobs: 1,
        },
        previous: WindowSnapshot::default(),
        engagement_delta: 100.0,
        job_success_delta: 100.0,
        trend_score: score,
        computed_at: Utc::now(),
    }
}

fn new_job(keyword_id: i64, owner: Uuid, priority: i64) -> NewJob {
    NewJob {
        keyword_id,
        job_type: JobType::Social,
        priority: Priority::new(priority).unwrap(),
        owner_id: owner,
        created_by: owner,
        job_config: serde_json::json!({}),
        expected_results: None,
        estimated_duration_secs: None,
        max_retries: 3,
    }
}

// ---------------------------------------------------------------------------
// Dequeue
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn pending_candidates_follow_priority_then_age(pool: sqlx::PgPool) {
    let owner = Uuid::new_v4();
    let kw = insert_test_keyword(&pool, owner, "espresso").await;
    let t0 = Utc::now() - Duration::minutes(10);

    let low = insert_job(&pool, &new_job(kw, owner, 5), t0).await.unwrap();
    let high_old = insert_job(&pool, &new_job(kw, owner, 9), t0 + Duration::minutes(1))
        .await
        .unwrap();
    let high_new = insert_job(&pool, &new_job(kw, owner, 9), t0 + Duration::minutes(2))
        .await
        .unwrap();

    let ids: Vec<i64> = list_pending_candidates(&pool, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![high_old.id, high_new.id, low.id]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn a_job_can_only_be_claimed_once(pool: sqlx::PgPool) {
    let owner = Uuid::new_v4();
    let kw = insert_test_keyword(&pool, owner, "latte").await;
    let now = Utc::now();
    let job = insert_job(&pool, &new_job(kw, owner, 5), now).await.unwrap();

    let expires = now + Duration::minutes(5);
    let first = claim_pending_job(&pool, job.id, "worker-a", expires, now)
        .await
        .unwrap();
    let second = claim_pending_job(&pool, job.id, "worker-b", expires, now)
        .await
        .unwrap();

    let claimed = first.expect("first claim should win");
    assert_eq!(claimed.status, "queued");
    assert_eq!(claimed.leased_by.as_deref(), Some("worker-a"));
    assert!(second.is_none(), "second claim must lose");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn expired_leases_return_to_pending(pool: sqlx::PgPool) {
    let owner = Uuid::new_v4();
    let kw = insert_test_keyword(&pool, owner, "mocha").await;
    let now = Utc::now();
    let job = insert_job(&pool, &new_job(kw, owner, 5), now).await.unwrap();

    claim_pending_job(&pool, job.id, "worker-a", now + Duration::seconds(30), now)
        .await
        .unwrap()
        .expect("claim");

    let reclaimed = reclaim_expired_leases(&pool, now + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(reclaimed, 1);

    let row = get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(row.status, "pending");
    assert!(row.leased_by.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn soft_deleted_jobs_are_invisible(pool: sqlx::PgPool) {
    let owner = Uuid::new_v4();
    let kw = insert_test_keyword(&pool, owner, "cortado").await;
    let now = Utc::now();
    let job = insert_job(&pool, &new_job(kw, owner, 5), now).await.unwrap();

    assert!(soft_delete_job(&pool, job.id, owner, now).await.unwrap());
    assert!(get_job(&pool, job.id).await.unwrap().is_none());
    assert!(list_pending_candidates(&pool, 10).await.unwrap().is_empty());
    assert!(claim_pending_job(&pool, job.id, "w", now, now)
        .await
        .unwrap()
        .is_none());
    assert!(!soft_delete_job(&pool, job.id, owner, now).await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn conditional_update_rejects_stale_status(pool: sqlx::PgPool) {
    let owner = Uuid::new_v4();
    let kw = insert_test_keyword(&pool, owner, "flat white").await;
    let now = Utc::now();
    let row = insert_job(&pool, &new_job(kw, owner, 5), now).await.unwrap();
    let mut job = kwpulse_core::Job::try_from(row).unwrap();

    job.status = JobStatus::Cancelled;
    job.completed_at = Some(now);
    job.actual_duration_secs = Some(0);

    assert!(!update_job_if_status(&pool, &job, JobStatus::Running, None)
        .await
        .unwrap());
    assert!(update_job_if_status(&pool, &job, JobStatus::Pending, None)
        .await
        .unwrap());

    let stored = get_job(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, "cancelled");
    assert!(stored.completed_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn conditional_update_rejects_a_previous_lease_holder(pool: sqlx::PgPool) {
    let owner = Uuid::new_v4();
    let kw = insert_test_keyword(&pool, owner, "macchiato").await;
    let now = Utc::now();
    let job = insert_job(&pool, &new_job(kw, owner, 5), now).await.unwrap();

    claim_pending_job(&pool, job.id, "worker-a", now + Duration::seconds(30), now)
        .await
        .unwrap()
        .expect("first claim");
    reclaim_expired_leases(&pool, now + Duration::minutes(1))
        .await
        .unwrap();
    let row = claim_pending_job(
        &pool,
        job.id,
        "worker-b",
        now + Duration::minutes(10),
        now + Duration::minutes(2),
    )
    .await
    .unwrap()
    .expect("second claim");

    let mut running = kwpulse_core::Job::try_from(row).unwrap();
    running.status = JobStatus::Running;
    running.started_at = Some(now + Duration::minutes(3));

    assert!(
        !update_job_if_status(&pool, &running, JobStatus::Queued, Some("worker-a"))
            .await
            .unwrap(),
        "the reclaimed holder must not write"
    );
    assert!(
        update_job_if_status(&pool, &running, JobStatus::Queued, Some("worker-b"))
            .await
            .unwrap()
    );
}

// ---------------------------------------------------------------------------
// Quota counts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn job_count_includes_soft_deleted_jobs_in_the_window(pool: sqlx::PgPool) {
    let owner = Uuid::new_v4();
    let kw = insert_test_keyword(&pool, owner, "affogato").await;
    let now = Utc::now();
    let window_start = now - Duration::hours(1);

    insert_job(&pool, &new_job(kw, owner, 5), now - Duration::hours(2))
        .await
        .unwrap();
    let recent = insert_job(&pool, &new_job(kw, owner, 5), now - Duration::minutes(30))
        .await
        .unwrap();
    insert_job(&pool, &new_job(kw, owner, 5), now).await.unwrap();
    assert!(soft_delete_job(&pool, recent.id, owner, now).await.unwrap());

    let count = count_jobs_created_since(&pool, owner, window_start)
        .await
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(
        count_jobs_created_since(&pool, Uuid::new_v4(), window_start)
            .await
            .unwrap(),
        0
    );
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn operation_log_counts_per_caller_and_type(pool: sqlx::PgPool) {
    let caller = Uuid::new_v4();
    let other = Uuid::new_v4();
    let now = Utc::now();

    record_operation(&pool, caller, "export", now - Duration::hours(2))
        .await
        .unwrap();
    record_operation(&pool, caller, "export", now).await.unwrap();
    record_operation(&pool, caller, "export", now).await.unwrap();
    record_operation(&pool, caller, "import", now).await.unwrap();
    record_operation(&pool, other, "export", now).await.unwrap();

    let since = now - Duration::hours(1);
    assert_eq!(
        count_operations_since(&pool, caller, "export", since)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        count_operations_since(&pool, caller, "import", since)
            .await
            .unwrap(),
        1
    );
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn analytics_upsert_replaces_in_place(pool: sqlx::PgPool) {
    let owner = Uuid::new_v4();
    let kw = insert_test_keyword(&pool, owner, "cold brew").await;
    let (start, end) = PeriodType::Daily.bounds_containing(Utc::now().date_naive());
    let key = PeriodKey {
        keyword_id: kw,
        period_start: start,
        period_end: end,
        period_type: PeriodType::Daily,
    };

    let first = PeriodMetrics {
        total_engagement: 10,
        total_jobs: 2,
        completed_jobs: 1,
        failed_jobs: 1,
        success_rate: Decimal::new(5000, 4),
        ..PeriodMetrics::default()
    };
    let row1 = upsert_keyword_analytics(&pool, &key, &first, owner, None, Utc::now())
        .await
        .unwrap();

    let second = PeriodMetrics {
        total_engagement: 25,
        ..first.clone()
    };
    let row2 = upsert_keyword_analytics(&pool, &key, &second, owner, None, Utc::now())
        .await
        .unwrap();

    assert_eq!(row1.id, row2.id, "upsert must not create a second row");
    let stored = get_keyword_analytics(&pool, &key).await.unwrap().unwrap();
    assert_eq!(stored.total_engagement, 25);
    assert_eq!(stored.success_rate, Decimal::new(5000, 4));
}

// ---------------------------------------------------------------------------
// Derived datasets
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn trend_replace_swaps_the_whole_dataset(pool: sqlx::PgPool) {
    let owner = Uuid::new_v4();
    let a = insert_test_keyword(&pool, owner, "ristretto").await;
    let b = insert_test_keyword(&pool, owner, "lungo").await;

    let written = replace_keyword_trends(&pool, &[trend(a, owner, 10.0), trend(b, owner, 70.0)])
        .await
        .unwrap();
    assert_eq!(written, 2);
    let ids: Vec<i64> = list_keyword_trends(&pool, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.keyword_id)
        .collect();
    assert_eq!(ids, vec![b, a], "highest score first");

    let written = replace_keyword_trends(&pool, &[trend(a, owner, 5.0)])
        .await
        .unwrap();
    assert_eq!(written, 1);
    let rows = list_keyword_trends(&pool, 10).await.unwrap();
    assert_eq!(rows.len(), 1, "stale records must not survive a replace");
    assert_eq!(rows[0].keyword_id, a);
    assert!((rows[0].trend_score - 5.0).abs() < f64::EPSILON);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires a live Postgres via DATABASE_URL"]
async fn category_rollups_cover_the_last_thirty_days(pool: sqlx::PgPool) {
    let owner = Uuid::new_v4();
    let beans = insert_categorized_keyword(&pool, owner, "arabica", "coffee").await;
    let more_beans = insert_categorized_keyword(&pool, owner, "robusta", "coffee").await;
    let loose = insert_test_keyword(&pool, owner, "chicory").await;

    put_daily(&pool, beans, owner, 1, 10).await;
    put_daily(&pool, more_beans, owner, 5, 15).await;
    put_daily(&pool, beans, owner, 45, 999).await;
    put_daily(&pool, loose, owner, 2, 7).await;

    let rows = refresh_category_rollups(&pool).await.unwrap();
    assert_eq!(rows, 2);
    // A second concurrent-mode refresh needs the unique index to succeed.
    refresh_category_rollups(&pool).await.unwrap();

    let rollups = list_category_rollups(&pool, owner).await.unwrap();
    assert_eq!(rollups.len(), 2);
    assert_eq!(rollups[0].category, "coffee");
    assert_eq!(rollups[0].keyword_count, 2);
    assert_eq!(rollups[0].total_engagement, 25);
    assert_eq!(rollups[0].completed_jobs, 2);
    assert_eq!(rollups[1].category, "uncategorized");
    assert_eq!(rollups[1].total_engagement, 7);
    assert!(list_category_rollups(&pool, Uuid::new_v4())
        .await
        .unwrap()
        .is_empty());
}
