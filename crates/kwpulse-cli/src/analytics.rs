//! Analytics and derived dataset command handlers.

use chrono::{Duration, NaiveDate, Utc};
use kwpulse_core::PeriodType;
use kwpulse_jobs::{AnalyticsStore, Pipeline, RefreshStatus, Store};
use uuid::Uuid;

/// # Errors
///
/// Returns an error if the keyword is missing or the upsert fails.
pub(crate) async fn run_compute_period<S: Store + 'static>(
    pipeline: &Pipeline<S>,
    keyword_id: i64,
    date: NaiveDate,
    period_type: PeriodType,
) -> anyhow::Result<()> {
    let period = pipeline
        .aggregator
        .compute_period_containing(keyword_id, date, period_type, Utc::now())
        .await?;
    let m = &period.metrics;
    println!(
        "{} {} .. {} keyword={}",
        period.key.period_type,
        period.key.period_start.format("%Y-%m-%d"),
        period.key.period_end.format("%Y-%m-%d"),
        keyword_id
    );
    println!(
        "  jobs={} completed={} failed={} success_rate={}",
        m.total_jobs, m.completed_jobs, m.failed_jobs, m.success_rate
    );
    println!(
        "  engagement={} social={} places={} rating={}",
        m.total_engagement,
        m.social_results,
        m.place_results,
        m.average_rating
            .map_or_else(|| "\u{2014}".to_string(), |r| r.to_string())
    );
    Ok(())
}

/// Runs the daily batch for `date`, or yesterday when `None`.
///
/// # Errors
///
/// Returns an error only if the keyword list cannot be read. Per-keyword
/// failures are printed and the batch continues.
pub(crate) async fn run_batch_daily<S: Store + 'static>(
    pipeline: &Pipeline<S>,
    date: Option<NaiveDate>,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let date = date.unwrap_or_else(|| (now - Duration::days(1)).date_naive());
    let report = pipeline
        .aggregator
        .batch_compute_daily_for(date, now)
        .await?;

    println!(
        "daily analytics for {}: {} processed, {} failed ({} ms)",
        report.date,
        report.processed,
        report.failed_count(),
        report.elapsed.as_millis()
    );
    for failure in &report.failed {
        println!("  keyword {}: {}", failure.keyword_id, failure.error);
    }
    Ok(())
}

/// Refreshes every dataset, or only `dataset` when given.
///
/// # Errors
///
/// Returns an error if `dataset` names no registered dataset or any refresh
/// failed.
pub(crate) async fn run_refresh<S: Store + 'static>(
    pipeline: &Pipeline<S>,
    dataset: Option<&str>,
) -> anyhow::Result<()> {
    let outcomes = match dataset {
        Some(name) => vec![pipeline.refresher.refresh_one(name).await?],
        None => pipeline.refresher.refresh_all().await.outcomes,
    };

    let mut failed = 0usize;
    for outcome in &outcomes {
        match &outcome.status {
            RefreshStatus::Succeeded { rows } => println!(
                "{:<20}ok      {rows} rows in {} ms",
                outcome.dataset,
                outcome.duration.as_millis()
            ),
            RefreshStatus::Failed { error } => {
                failed += 1;
                println!("{:<20}FAILED  {error}", outcome.dataset);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} dataset(s) failed to refresh");
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the trend dataset cannot be read.
pub(crate) async fn run_trends<S: Store + 'static>(
    pipeline: &Pipeline<S>,
    limit: u32,
) -> anyhow::Result<()> {
    let trends = pipeline.store.trends(limit).await?;
    if trends.is_empty() {
        println!("no trends yet; run `refresh` first");
        return Ok(());
    }

    println!(
        "{:<10}{:>10}{:>12}{:>12}{:>12}",
        "KEYWORD", "SCORE", "ENGAGEMENT", "RECENT", "PREVIOUS"
    );
    for t in &trends {
        println!(
            "{:<10}{:>10.1}{:>11.1}%{:>12}{:>12}",
            t.keyword_id,
            t.trend_score,
            t.engagement_delta,
            t.recent.engagement,
            t.previous.engagement
        );
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the rollup dataset cannot be read.
pub(crate) async fn run_rollups<S: Store + 'static>(
    pipeline: &Pipeline<S>,
    owner: Uuid,
) -> anyhow::Result<()> {
    let rollups = pipeline.store.rollups_for_owner(owner).await?;
    if rollups.is_empty() {
        println!("no rollups for {owner}; run `refresh` first");
        return Ok(());
    }

    println!(
        "{:<24}{:>10}{:>12}{:>8}{:>11}",
        "CATEGORY", "KEYWORDS", "ENGAGEMENT", "JOBS", "COMPLETED"
    );
    for r in &rollups {
        println!(
            "{:<24}{:>10}{:>12}{:>8}{:>11}",
            r.category, r.keyword_count, r.total_engagement, r.total_jobs, r.completed_jobs
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwpulse_jobs::{MemoryStore, PipelineSettings};
    use std::sync::Arc;

    fn pipeline() -> (Arc<MemoryStore>, Pipeline<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(Arc::clone(&store), PipelineSettings::default());
        (store, pipeline)
    }

    #[tokio::test]
    async fn batch_daily_skips_failing_keywords() {
        let (store, pipeline) = pipeline();
        let owner = Uuid::new_v4();
        store.add_keyword(owner, "yerba mate", None);
        let broken = store.add_keyword(owner, "rooibos", None);
        store.fail_reads_for_keyword(broken.id);

        run_batch_daily(&pipeline, NaiveDate::from_ymd_opt(2026, 9, 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refresh_of_unknown_dataset_fails() {
        let (_store, pipeline) = pipeline();
        assert!(run_refresh(&pipeline, Some("nope")).await.is_err());
    }

    #[tokio::test]
    async fn refresh_then_trends_lists_keywords() {
        let (store, pipeline) = pipeline();
        store.add_keyword(Uuid::new_v4(), "chai", Some("tea"));

        run_refresh(&pipeline, None).await.unwrap();

        assert_eq!(store.trends(10).await.unwrap().len(), 1);
        run_trends(&pipeline, 10).await.unwrap();
    }

    #[tokio::test]
    async fn rollups_are_scoped_to_the_owner() {
        let (store, pipeline) = pipeline();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.add_keyword(owner, "sencha", Some("tea"));
        store.add_keyword(owner, "hojicha", Some("tea"));
        store.add_keyword(other, "espresso", Some("coffee"));

        run_refresh(&pipeline, None).await.unwrap();

        let mine = store.rollups_for_owner(owner).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].category, "tea");
        assert_eq!(mine[0].keyword_count, 2);
        run_rollups(&pipeline, owner).await.unwrap();
        run_rollups(&pipeline, Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn compute_period_requires_a_live_keyword() {
        let (_store, pipeline) = pipeline();
        let date = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        assert!(run_compute_period(&pipeline, 404, date, PeriodType::Weekly)
            .await
            .is_err());
    }
}
