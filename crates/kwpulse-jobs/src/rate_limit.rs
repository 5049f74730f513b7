//! Per-caller hourly quotas.
//!
//! Usage is counted from the start of the current UTC clock hour, so a quota
//! resets at the top of every hour. The check and the write that follows it
//! are not atomic: two concurrent requests can both pass the check when the
//! caller sits one below the limit. The limiter is a soft guard against
//! runaway clients, not an exact admission counter.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};
use kwpulse_core::{AppConfig, OperationType};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::store::JobStore;

pub const DEFAULT_SCRAPING_JOB_QUOTA: u32 = 100;
pub const DEFAULT_BULK_ASSIGNMENT_QUOTA: u32 = 1000;
pub const DEFAULT_OTHER_QUOTA: u32 = 50;

/// Hourly limits per operation type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaConfig {
    pub scraping_job: u32,
    pub bulk_assignment: u32,
    /// Limit for any named operation without an entry in `named`.
    pub default: u32,
    /// Limits for specific [`OperationType::Other`] names.
    pub named: HashMap<String, u32>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            scraping_job: DEFAULT_SCRAPING_JOB_QUOTA,
            bulk_assignment: DEFAULT_BULK_ASSIGNMENT_QUOTA,
            default: DEFAULT_OTHER_QUOTA,
            named: HashMap::new(),
        }
    }
}

impl QuotaConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            scraping_job: config.quota_scraping_job,
            bulk_assignment: config.quota_bulk_assignment,
            default: config.quota_default,
            named: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_named(mut self, operation: &str, limit: u32) -> Self {
        self.named.insert(operation.to_string(), limit);
        self
    }

    #[must_use]
    pub fn limit_for(&self, operation: &OperationType) -> u32 {
        match operation {
            OperationType::ScrapingJob => self.scraping_job,
            OperationType::BulkAssignment => self.bulk_assignment,
            OperationType::Other(name) => self.named.get(name).copied().unwrap_or(self.default),
        }
    }
}

/// Start of the UTC clock hour containing `now`.
#[must_use]
pub fn hour_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(Duration::hours(1)).unwrap_or(now)
}

pub struct RateLimiter<S: ?Sized> {
    store: Arc<S>,
    quotas: QuotaConfig,
}

impl<S: ?Sized> Clone for RateLimiter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            quotas: self.quotas.clone(),
        }
    }
}

impl<S: JobStore + ?Sized> RateLimiter<S> {
    pub fn new(store: Arc<S>, quotas: QuotaConfig) -> Self {
        Self { store, quotas }
    }

    #[must_use]
    pub fn quotas(&self) -> &QuotaConfig {
        &self.quotas
    }

    /// Returns `true` if `caller` may perform one more `operation` this hour.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if usage cannot be counted.
    pub async fn check_quota(
        &self,
        caller: Uuid,
        operation: &OperationType,
    ) -> Result<bool, PipelineError> {
        self.check_quota_at(caller, operation, Utc::now()).await
    }

    /// [`Self::check_quota`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if usage cannot be counted.
    pub async fn check_quota_at(
        &self,
        caller: Uuid,
        operation: &OperationType,
        now: DateTime<Utc>,
    ) -> Result<bool, PipelineError> {
        let limit = self.quotas.limit_for(operation);
        let used = self
            .store
            .count_operations_since(caller, operation, hour_start(now))
            .await?;
        Ok(used < u64::from(limit))
    }

    /// Like [`Self::check_quota_at`] but turns a refusal into an error.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RateLimitExceeded`] when the caller is at the
    /// limit, or [`PipelineError::Store`] if usage cannot be counted.
    pub async fn enforce_at(
        &self,
        caller: Uuid,
        operation: &OperationType,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        if self.check_quota_at(caller, operation, now).await? {
            return Ok(());
        }

        let limit = self.quotas.limit_for(operation);
        tracing::warn!(%caller, operation = %operation, limit, "rate limit exceeded");
        Err(PipelineError::RateLimitExceeded {
            operation: operation.to_string(),
            limit,
        })
    }

    /// Counts one `operation` for `caller` at `at`.
    ///
    /// Job creation and assignment inserts are counted from their own rows,
    /// so recording those is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if the usage write fails.
    pub async fn record(
        &self,
        caller: Uuid,
        operation: &OperationType,
        at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        self.store.record_operation(caller, operation, at).await?;
        Ok(())
    }
}
