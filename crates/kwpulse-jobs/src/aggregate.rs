//! Per-keyword, per-period analytics rollups.
//!
//! A period row is a pure function of the jobs and assignments created inside
//! its bounds, so recomputing it is idempotent: the upsert replaces the row in
//! place and only `computed_at` moves.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use kwpulse_core::{
    AnalyticsPeriod, Job, JobStatus, KeywordAssignment, PeriodKey, PeriodMetrics, PeriodType,
    TargetKind,
};
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::hooks::MetricsHook;
use crate::store::Store;

const SUCCESS_RATE_DP: u32 = 4;
const RATING_DP: u32 = 2;

// ---------------------------------------------------------------------------
// Metric computation
// ---------------------------------------------------------------------------

fn count_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Folds the raw jobs and assignments of one period into its counters.
#[must_use]
pub fn summarize(jobs: &[Job], assignments: &[KeywordAssignment]) -> PeriodMetrics {
    let completed = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Completed)
        .count();
    let failed = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Failed)
        .count();
    let total_results = jobs.iter().map(|j| i64::from(j.results_count)).sum();

    let finished = completed + failed;
    let success_rate = if finished == 0 {
        Decimal::ZERO
    } else {
        (Decimal::from(completed) / Decimal::from(finished))
            .round_dp_with_strategy(SUCCESS_RATE_DP, RoundingStrategy::MidpointAwayFromZero)
    };

    let social = assignments
        .iter()
        .filter(|a| a.target_kind == TargetKind::SocialPost)
        .count();
    let places: Vec<&KeywordAssignment> = assignments
        .iter()
        .filter(|a| a.target_kind == TargetKind::Place)
        .collect();
    let ratings: Vec<Decimal> = places.iter().filter_map(|a| a.rating).collect();
    let average_rating = if ratings.is_empty() {
        None
    } else {
        let sum: Decimal = ratings.iter().copied().sum();
        Some(
            (sum / Decimal::from(ratings.len()))
                .round_dp_with_strategy(RATING_DP, RoundingStrategy::MidpointAwayFromZero),
        )
    };

    PeriodMetrics {
        total_engagement: assignments.iter().map(|a| a.engagement).sum(),
        social_results: count_i32(social),
        place_results: count_i32(places.len()),
        average_rating,
        total_jobs: count_i32(jobs.len()),
        completed_jobs: count_i32(completed),
        failed_jobs: count_i32(failed),
        total_results,
        success_rate,
    }
}

// ---------------------------------------------------------------------------
// Batch report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordFailure {
    pub keyword_id: i64,
    pub error: String,
}

/// Outcome of one batch run over every active keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub date: NaiveDate,
    pub processed: usize,
    pub failed: Vec<KeywordFailure>,
    pub elapsed: StdDuration,
}

impl BatchReport {
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct AnalyticsAggregator<S: ?Sized> {
    store: Arc<S>,
    hooks: Vec<Arc<dyn MetricsHook>>,
}

impl<S: Store + ?Sized> AnalyticsAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            hooks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn MetricsHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Recomputes and upserts the metrics for one keyword over `[start, end]`.
    ///
    /// Hooks run after the upsert; a failing hook is logged and skipped.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Validation`] if `end` precedes `start`
    /// - [`PipelineError::NotFound`] if the keyword is missing or soft-deleted
    /// - [`PipelineError::Store`] if reading inputs or the upsert fails
    pub async fn compute_period(
        &self,
        keyword_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_type: PeriodType,
    ) -> Result<AnalyticsPeriod, PipelineError> {
        self.compute_period_at(keyword_id, start, end, period_type, None, Utc::now())
            .await
    }

    /// [`Self::compute_period`] with an explicit actor and clock.
    ///
    /// # Errors
    ///
    /// See [`Self::compute_period`].
    pub async fn compute_period_at(
        &self,
        keyword_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        period_type: PeriodType,
        actor: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<AnalyticsPeriod, PipelineError> {
        if end < start {
            return Err(PipelineError::Validation(format!(
                "period end {end} precedes start {start}"
            )));
        }

        let keyword = self
            .store
            .get_keyword(keyword_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("keyword", keyword_id))?;

        let jobs = self
            .store
            .jobs_for_keyword_between(keyword_id, start, end)
            .await?;
        let assignments = self
            .store
            .assignments_for_keyword_between(keyword_id, start, end)
            .await?;
        let metrics = summarize(&jobs, &assignments);

        let key = PeriodKey {
            keyword_id,
            period_start: start,
            period_end: end,
            period_type,
        };
        let period = self
            .store
            .upsert_period(&key, &metrics, keyword.owner_id, actor, now)
            .await?;

        tracing::debug!(
            keyword_id,
            period_type = %period_type,
            total_jobs = metrics.total_jobs,
            total_engagement = metrics.total_engagement,
            "analytics period computed"
        );

        for hook in &self.hooks {
            if let Err(e) = hook.after_period_computed(&period).await {
                tracing::warn!(keyword_id, hook = hook.name(), error = %e, "metrics hook failed");
            }
        }

        Ok(period)
    }

    /// Computes the period of `period_type` containing `date`.
    ///
    /// # Errors
    ///
    /// See [`Self::compute_period`].
    pub async fn compute_period_containing(
        &self,
        keyword_id: i64,
        date: NaiveDate,
        period_type: PeriodType,
        now: DateTime<Utc>,
    ) -> Result<AnalyticsPeriod, PipelineError> {
        let (start, end) = period_type.bounds_containing(date);
        self.compute_period_at(keyword_id, start, end, period_type, None, now)
            .await
    }

    /// Computes yesterday's daily period for every active keyword.
    ///
    /// # Errors
    ///
    /// See [`Self::batch_compute_daily_for`].
    pub async fn batch_compute_daily(&self) -> Result<BatchReport, PipelineError> {
        let now = Utc::now();
        let yesterday = (now - Duration::days(1)).date_naive();
        self.batch_compute_daily_for(yesterday, now).await
    }

    /// Computes the daily period for `date` for every active keyword.
    ///
    /// One keyword failing is logged and recorded in the report; the others
    /// still run.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] only if the keyword list cannot be read.
    pub async fn batch_compute_daily_for(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<BatchReport, PipelineError> {
        let started = Instant::now();
        let keywords = self.store.active_keywords().await?;
        tracing::info!(%date, keywords = keywords.len(), "starting daily analytics batch");

        let mut processed = 0usize;
        let mut failed = Vec::new();
        for keyword in &keywords {
            match self
                .compute_period_containing(keyword.id, date, PeriodType::Daily, now)
                .await
            {
                Ok(_) => processed += 1,
                Err(e) => {
                    tracing::error!(keyword_id = keyword.id, error = %e, "daily analytics failed for keyword");
                    failed.push(KeywordFailure {
                        keyword_id: keyword.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let report = BatchReport {
            date,
            processed,
            failed,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            %date,
            processed = report.processed,
            failed = report.failed_count(),
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "daily analytics batch complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[path = "aggregate_test.rs"]
mod tests;
