//! Side effects that run after an analytics period is written.

use std::sync::Arc;

use async_trait::async_trait;
use kwpulse_core::{AnalyticsPeriod, PeriodMetrics, PeriodType, Priority};
use rust_decimal::prelude::ToPrimitive;

use crate::error::PipelineError;
use crate::store::JobStore;

/// Engagement at which the engagement half of the priority score saturates.
pub const ENGAGEMENT_SATURATION: f64 = 10_000.0;

/// Invoked by the aggregator after every successful period upsert.
///
/// Failures are logged by the caller and never undo the period write.
#[async_trait]
pub trait MetricsHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn after_period_computed(&self, period: &AnalyticsPeriod) -> Result<(), PipelineError>;
}

/// Maps period metrics to a keyword priority in `1..=10`.
///
/// Half the score is the job success rate, half is engagement relative to
/// [`ENGAGEMENT_SATURATION`].
#[must_use]
pub fn priority_from_metrics(metrics: &PeriodMetrics) -> Priority {
    let success = metrics.success_rate.to_f64().unwrap_or(0.0).clamp(0.0, 1.0);
    #[allow(clippy::cast_precision_loss)]
    let engagement = (metrics.total_engagement.max(0) as f64 / ENGAGEMENT_SATURATION).min(1.0);
    let score = 0.5 * success + 0.5 * engagement;
    #[allow(clippy::cast_possible_truncation)]
    let scaled = (9.0 * score).round() as i64;
    Priority::saturating(1 + scaled)
}

/// Recalculates a keyword's priority from each new daily period.
pub struct KeywordPriorityHook<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> KeywordPriorityHook<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: JobStore + ?Sized> MetricsHook for KeywordPriorityHook<S> {
    fn name(&self) -> &'static str {
        "keyword_priority"
    }

    async fn after_period_computed(&self, period: &AnalyticsPeriod) -> Result<(), PipelineError> {
        if period.key.period_type != PeriodType::Daily {
            return Ok(());
        }

        let priority = priority_from_metrics(&period.metrics);
        let changed = self
            .store
            .set_keyword_priority(period.key.keyword_id, priority)
            .await?;
        if changed {
            tracing::info!(
                keyword_id = period.key.keyword_id,
                priority = priority.get(),
                "keyword priority recalculated"
            );
        }
        Ok(())
    }
}
