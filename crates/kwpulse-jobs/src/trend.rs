//! Keyword trend scores from two adjacent seven-day windows.
//!
//! The recent window covers the seven days before today (UTC), the previous
//! window the seven days before that. Both are summed from daily analytics
//! periods, so today's activity never counts.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use kwpulse_core::analytics::midnight_utc;
use kwpulse_core::{AnalyticsPeriod, Keyword, TrendRecord, WindowSnapshot};

use crate::error::PipelineError;
use crate::store::Store;

pub const WINDOW_DAYS: i64 = 7;
pub const ENGAGEMENT_WEIGHT: f64 = 0.7;
pub const JOB_SUCCESS_WEIGHT: f64 = 0.3;
/// Delta reported when a keyword goes from nothing to something.
pub const NEW_ACTIVITY_DELTA: f64 = 100.0;

/// Percentage change from `previous` to `recent`.
///
/// A zero baseline yields [`NEW_ACTIVITY_DELTA`] if there is recent activity
/// and `0.0` otherwise.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn relative_delta(recent: i64, previous: i64) -> f64 {
    if previous == 0 {
        return if recent > 0 { NEW_ACTIVITY_DELTA } else { 0.0 };
    }
    (recent - previous) as f64 / previous as f64 * 100.0
}

#[must_use]
pub fn trend_score(engagement_delta: f64, job_success_delta: f64) -> f64 {
    ENGAGEMENT_WEIGHT * engagement_delta + JOB_SUCCESS_WEIGHT * job_success_delta
}

#[must_use]
pub fn build_record(
    keyword: &Keyword,
    recent: WindowSnapshot,
    previous: WindowSnapshot,
    computed_at: DateTime<Utc>,
) -> TrendRecord {
    let engagement_delta = relative_delta(recent.engagement, previous.engagement);
    let job_success_delta = relative_delta(recent.completed_jobs, previous.completed_jobs);
    TrendRecord {
        keyword_id: keyword.id,
        owner_id: keyword.owner_id,
        recent,
        previous,
        engagement_delta,
        job_success_delta,
        trend_score: trend_score(engagement_delta, job_success_delta),
        computed_at,
    }
}

fn accumulate(window: &mut WindowSnapshot, period: &AnalyticsPeriod) {
    window.engagement += period.metrics.total_engagement;
    window.total_jobs += i64::from(period.metrics.total_jobs);
    window.completed_jobs += i64::from(period.metrics.completed_jobs);
}

pub struct TrendComputer<S: ?Sized> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> TrendComputer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Computes one trend record per active keyword without writing anything.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if keywords or periods cannot be read.
    pub async fn compute_at(&self, now: DateTime<Utc>) -> Result<Vec<TrendRecord>, PipelineError> {
        let today = midnight_utc(now.date_naive());
        let recent_start = today - Duration::days(WINDOW_DAYS);
        let previous_start = recent_start - Duration::days(WINDOW_DAYS);

        let periods = self
            .store
            .daily_periods_between(previous_start, today)
            .await?;
        let mut windows: HashMap<i64, (WindowSnapshot, WindowSnapshot)> = HashMap::new();
        for period in &periods {
            let (recent, previous) = windows.entry(period.key.keyword_id).or_default();
            if period.key.period_start >= recent_start {
                accumulate(recent, period);
            } else {
                accumulate(previous, period);
            }
        }

        let keywords = self.store.active_keywords().await?;
        Ok(keywords
            .iter()
            .map(|keyword| {
                let (recent, previous) = windows.get(&keyword.id).copied().unwrap_or_default();
                build_record(keyword, recent, previous, now)
            })
            .collect())
    }

    /// Recomputes and replaces the whole trend dataset.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if reading or the replace fails. A
    /// failed replace leaves the previous dataset in place.
    pub async fn refresh(&self) -> Result<u64, PipelineError> {
        self.refresh_at(Utc::now()).await
    }

    /// [`Self::refresh`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::refresh`].
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> Result<u64, PipelineError> {
        let records = self.compute_at(now).await?;
        let rising = records.iter().filter(|r| r.trend_score > 0.0).count();
        let written = self.store.replace_trends(records).await?;
        tracing::info!(written, rising, "keyword trends refreshed");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AnalyticsStore, MemoryStore};
    use chrono::{NaiveDate, TimeZone};
    use kwpulse_core::{PeriodKey, PeriodMetrics, PeriodType};
    use uuid::Uuid;

    #[test]
    fn zero_baseline_with_activity_is_a_full_rise() {
        assert!((relative_delta(40, 0) - 100.0).abs() < f64::EPSILON);
        assert!(relative_delta(0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn delta_is_a_percentage() {
        assert!((relative_delta(150, 100) - 50.0).abs() < 1e-9);
        assert!((relative_delta(50, 100) + 50.0).abs() < 1e-9);
    }

    #[test]
    fn score_weights_engagement_over_jobs() {
        assert!((trend_score(100.0, 100.0) - 100.0).abs() < 1e-9);
        assert!((trend_score(10.0, 0.0) - 7.0).abs() < 1e-9);
        assert!((trend_score(0.0, 10.0) - 3.0).abs() < 1e-9);
    }

    async fn put_daily(
        store: &MemoryStore,
        keyword: &Keyword,
        date: NaiveDate,
        engagement: i64,
        completed: i32,
    ) {
        let (start, end) = PeriodType::Daily.bounds_containing(date);
        let key = PeriodKey {
            keyword_id: keyword.id,
            period_start: start,
            period_end: end,
            period_type: PeriodType::Daily,
        };
        let metrics = PeriodMetrics {
            total_engagement: engagement,
            total_jobs: completed,
            completed_jobs: completed,
            ..PeriodMetrics::default()
        };
        store
            .upsert_period(&key, &metrics, keyword.owner_id, None, start)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn windows_split_on_the_seven_day_boundary() {
        let store = Arc::new(MemoryStore::new());
        let keyword = store.add_keyword(Uuid::new_v4(), "kombucha", None);
        let now = Utc.with_ymd_and_hms(2026, 7, 15, 6, 0, 0).unwrap();
        let d = |day| NaiveDate::from_ymd_opt(2026, 7, day).unwrap();

        put_daily(&store, &keyword, d(14), 30, 1).await; // recent
        put_daily(&store, &keyword, d(8), 30, 1).await; // recent, first day
        put_daily(&store, &keyword, d(7), 20, 1).await; // previous, last day
        put_daily(&store, &keyword, d(1), 20, 1).await; // previous, first day
        put_daily(&store, &keyword, d(15), 999, 9).await; // today, excluded
        put_daily(&store, &keyword, d(1) - Duration::days(1), 999, 9).await; // too old

        let records = TrendComputer::new(Arc::clone(&store))
            .compute_at(now)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.recent.engagement, 60);
        assert_eq!(record.previous.engagement, 40);
        assert!((record.engagement_delta - 50.0).abs() < 1e-9);
        assert!(record.job_success_delta.abs() < 1e-9);
        assert!((record.trend_score - 35.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn keywords_without_history_get_flat_records() {
        let store = Arc::new(MemoryStore::new());
        store.add_keyword(Uuid::new_v4(), "kefir", None);

        let written = TrendComputer::new(Arc::clone(&store))
            .refresh_at(Utc::now())
            .await
            .unwrap();
        assert_eq!(written, 1);

        let trends = store.trends(10).await.unwrap();
        assert!(trends[0].recent.is_empty());
        assert!(trends[0].trend_score.abs() < f64::EPSILON);
    }
}
