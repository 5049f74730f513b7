//! Nightly analytics batch and derived dataset refresh.

use std::sync::Arc;

use kwpulse_jobs::{Pipeline, Store};
use tokio_cron_scheduler::{Job, JobSchedulerError};

/// Computes yesterday's daily period for every active keyword.
pub(super) fn daily_analytics_job<S: Store + 'static>(
    cron: &str,
    pipeline: Arc<Pipeline<S>>,
) -> Result<Job, JobSchedulerError> {
    Job::new_async(cron, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);

        Box::pin(async move {
            tracing::info!("scheduler: starting daily analytics batch");
            run_daily_analytics(&pipeline).await;
        })
    })
}

/// Recomputes every derived dataset.
pub(super) fn refresh_job<S: Store + 'static>(
    cron: &str,
    pipeline: Arc<Pipeline<S>>,
) -> Result<Job, JobSchedulerError> {
    Job::new_async(cron, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);

        Box::pin(async move {
            run_refresh(&pipeline).await;
        })
    })
}

pub(super) async fn run_daily_analytics<S: Store + 'static>(pipeline: &Pipeline<S>) {
    match pipeline.aggregator.batch_compute_daily().await {
        Ok(report) if report.failed.is_empty() => {
            tracing::info!(
                date = %report.date,
                processed = report.processed,
                "scheduler: daily analytics batch complete"
            );
        }
        Ok(report) => {
            let failed_ids: Vec<i64> = report.failed.iter().map(|f| f.keyword_id).collect();
            tracing::warn!(
                date = %report.date,
                processed = report.processed,
                failed = ?failed_ids,
                "scheduler: daily analytics batch finished with failures"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: daily analytics batch could not start");
        }
    }
}

pub(super) async fn run_refresh<S: Store + 'static>(pipeline: &Pipeline<S>) {
    let report = pipeline.refresher.refresh_all().await;
    for outcome in report.failed() {
        tracing::warn!(dataset = %outcome.dataset, "scheduler: dataset left stale until next refresh");
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use kwpulse_core::{PeriodKey, PeriodType};
    use kwpulse_jobs::AnalyticsStore;
    use uuid::Uuid;

    use super::super::test_support::pipeline;
    use super::*;

    #[tokio::test]
    async fn daily_run_writes_yesterdays_periods() {
        let (store, pipeline) = pipeline();
        let keyword = store.add_keyword(Uuid::new_v4(), "espresso", None);

        run_daily_analytics(&pipeline).await;

        let yesterday = (Utc::now() - Duration::days(1)).date_naive();
        let (start, end) = PeriodType::Daily.bounds_containing(yesterday);
        let key = PeriodKey {
            keyword_id: keyword.id,
            period_start: start,
            period_end: end,
            period_type: PeriodType::Daily,
        };
        assert!(store.get_period(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn refresh_run_rebuilds_trends() {
        let (store, pipeline) = pipeline();
        store.add_keyword(Uuid::new_v4(), "cappuccino", Some("coffee"));

        run_refresh(&pipeline).await;

        assert_eq!(store.trends(10).await.unwrap().len(), 1);
        assert_eq!(store.category_rollups().len(), 1);
    }
}
