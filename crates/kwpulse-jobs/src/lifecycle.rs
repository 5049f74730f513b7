//! Job creation, the status state machine, retries and soft delete.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kwpulse_core::{Job, JobStatus, JobType, NewJob, OperationType, Priority};
use serde_json::Value;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::rate_limit::RateLimiter;
use crate::store::JobStore;

/// Attempts for a status write that keeps losing its conditional update.
pub const MAX_UPDATE_ATTEMPTS: u32 = 3;

pub const DEFAULT_MAX_RETRIES: i32 = 3;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CreateJobRequest {
    pub keyword_id: i64,
    pub job_type: JobType,
    /// Falls back to the keyword's current priority.
    pub priority: Option<Priority>,
    /// Provider parameters. `null` is stored as an empty object.
    pub config: Value,
    pub expected_results: Option<i32>,
    pub estimated_duration_secs: Option<i64>,
    /// Falls back to the manager's configured default.
    pub max_retries: Option<i32>,
}

impl CreateJobRequest {
    #[must_use]
    pub fn new(keyword_id: i64, job_type: JobType) -> Self {
        Self {
            keyword_id,
            job_type,
            priority: None,
            config: Value::Object(serde_json::Map::new()),
            expected_results: None,
            estimated_duration_secs: None,
            max_retries: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if !(self.config.is_object() || self.config.is_null()) {
            return Err(PipelineError::Validation(
                "job config must be a JSON object".to_string(),
            ));
        }
        if self.expected_results.is_some_and(|n| n < 0) {
            return Err(PipelineError::Validation(
                "expected_results must not be negative".to_string(),
            ));
        }
        if self.estimated_duration_secs.is_some_and(|n| n < 0) {
            return Err(PipelineError::Validation(
                "estimated_duration_secs must not be negative".to_string(),
            ));
        }
        if self.max_retries.is_some_and(|n| n < 0) {
            return Err(PipelineError::Validation(
                "max_retries must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// A status change reported by a worker or an operator.
///
/// Optional fields left as `None` keep their stored value. An update that
/// names a `worker_id` is accepted only while that worker holds the job's
/// lease; operator updates leave it unset.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub worker_id: Option<String>,
    pub results_count: Option<i32>,
    pub job_results: Option<Value>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub actor: Option<Uuid>,
}

impl StatusUpdate {
    #[must_use]
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            worker_id: None,
            results_count: None,
            job_results: None,
            error_message: None,
            error_code: None,
            actor: None,
        }
    }

    #[must_use]
    pub fn from_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    #[must_use]
    pub fn with_results(mut self, results_count: i32, job_results: Option<Value>) -> Self {
        self.results_count = Some(results_count);
        self.job_results = job_results;
        self
    }

    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>, code: Option<String>) -> Self {
        self.error_message = Some(message.into());
        self.error_code = code;
        self
    }

    #[must_use]
    pub fn by(mut self, actor: Uuid) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// Outcome of [`JobLifecycleManager::retry_failed_jobs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrySweepReport {
    pub requeued: Vec<i64>,
    pub skipped: Vec<(i64, String)>,
}

// ---------------------------------------------------------------------------
// Pure transition logic
// ---------------------------------------------------------------------------

/// Applies `update` to `current`, returning the record to write.
///
/// Entering `running` stamps `started_at` once. Entering a terminal status
/// stamps `completed_at`, derives `actual_duration_secs` when the job had
/// started, and drops the lease. Returning to `pending` drops the lease too.
///
/// # Errors
///
/// - [`PipelineError::LeaseNotHeld`] if `update` names a worker that does not
///   hold the current lease
/// - [`PipelineError::InvalidTransition`] if the state machine forbids the move
/// - [`PipelineError::Validation`] for a negative result count
pub fn apply_status_update(
    current: &Job,
    update: &StatusUpdate,
    now: DateTime<Utc>,
) -> Result<Job, PipelineError> {
    if let Some(worker_id) = &update.worker_id {
        if current.leased_by.as_deref() != Some(worker_id.as_str()) {
            return Err(PipelineError::LeaseNotHeld {
                job_id: current.id,
                worker_id: worker_id.clone(),
            });
        }
    }
    if !current.status.can_transition_to(update.status) {
        return Err(PipelineError::InvalidTransition {
            job_id: current.id,
            from: current.status,
            to: update.status,
        });
    }
    if update.results_count.is_some_and(|n| n < 0) {
        return Err(PipelineError::Validation(
            "results_count must not be negative".to_string(),
        ));
    }

    let mut next = current.clone();
    next.status = update.status;

    match update.status {
        JobStatus::Running => {
            if next.started_at.is_none() {
                next.started_at = Some(now);
            }
        }
        JobStatus::Pending => {
            next.leased_by = None;
            next.lease_expires_at = None;
        }
        status if status.is_terminal() => {
            next.completed_at = Some(now);
            next.actual_duration_secs = next
                .started_at
                .map(|started| (now - started).num_seconds().max(0));
            next.leased_by = None;
            next.lease_expires_at = None;
        }
        _ => {}
    }

    if let Some(count) = update.results_count {
        next.results_count = count;
    }
    if update.job_results.is_some() {
        next.job_results.clone_from(&update.job_results);
    }
    if update.error_message.is_some() {
        next.error_message.clone_from(&update.error_message);
    }
    if update.error_code.is_some() {
        next.error_code.clone_from(&update.error_code);
    }
    if let Some(actor) = update.actor {
        next.updated_by = Some(actor);
    }
    next.updated_at = now;

    Ok(next)
}

/// Resets a failed job for another attempt.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidTransition`] unless the job is `failed`,
/// or [`PipelineError::RetriesExhausted`] once `retry_count` has reached
/// `max_retries`.
pub fn prepare_retry(current: &Job, now: DateTime<Utc>) -> Result<Job, PipelineError> {
    if current.status != JobStatus::Failed {
        return Err(PipelineError::InvalidTransition {
            job_id: current.id,
            from: current.status,
            to: JobStatus::Pending,
        });
    }
    if !current.has_retry_budget() {
        return Err(PipelineError::RetriesExhausted {
            job_id: current.id,
            max_retries: current.max_retries,
        });
    }

    let mut next = current.clone();
    next.status = JobStatus::Pending;
    next.retry_count += 1;
    next.results_count = 0;
    next.job_results = None;
    next.started_at = None;
    next.completed_at = None;
    next.actual_duration_secs = None;
    next.error_message = None;
    next.error_code = None;
    next.leased_by = None;
    next.lease_expires_at = None;
    next.updated_at = now;
    Ok(next)
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct JobLifecycleManager<S: ?Sized> {
    store: Arc<S>,
    rate_limiter: RateLimiter<S>,
    default_max_retries: i32,
}

impl<S: JobStore + ?Sized> JobLifecycleManager<S> {
    pub fn new(store: Arc<S>, rate_limiter: RateLimiter<S>) -> Self {
        Self {
            store,
            rate_limiter,
            default_max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    #[must_use]
    pub fn with_default_max_retries(mut self, max_retries: i32) -> Self {
        self.default_max_retries = max_retries.max(0);
        self
    }

    // -----------------------------------------------------------------------
    // create_job
    // -----------------------------------------------------------------------

    /// Creates a `pending` job for a keyword the caller owns.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Validation`] for a malformed request
    /// - [`PipelineError::NotFound`] if the keyword is missing or soft-deleted
    /// - [`PipelineError::Unauthorized`] if `caller` does not own the keyword
    /// - [`PipelineError::RateLimitExceeded`] once the hourly job quota is used
    /// - [`PipelineError::Store`] on persistence failure
    pub async fn create_job(
        &self,
        request: CreateJobRequest,
        caller: Uuid,
    ) -> Result<Job, PipelineError> {
        self.create_job_at(request, caller, Utc::now()).await
    }

    /// [`Self::create_job`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::create_job`].
    pub async fn create_job_at(
        &self,
        request: CreateJobRequest,
        caller: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Job, PipelineError> {
        request.validate()?;

        let keyword = self
            .store
            .get_keyword(request.keyword_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("keyword", request.keyword_id))?;
        if !keyword.is_owned_by(caller) {
            return Err(PipelineError::Unauthorized {
                caller,
                keyword_id: keyword.id,
            });
        }

        self.rate_limiter
            .enforce_at(caller, &OperationType::ScrapingJob, now)
            .await?;

        let job_config = if request.config.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            request.config
        };
        let new_job = NewJob {
            keyword_id: keyword.id,
            job_type: request.job_type,
            priority: request.priority.unwrap_or(keyword.priority),
            owner_id: keyword.owner_id,
            created_by: caller,
            job_config,
            expected_results: request.expected_results,
            estimated_duration_secs: request.estimated_duration_secs,
            max_retries: request.max_retries.unwrap_or(self.default_max_retries),
        };

        let job = self.store.insert_job(new_job, now).await?;
        tracing::info!(
            job_id = job.id,
            keyword_id = job.keyword_id,
            job_type = %job.job_type,
            priority = job.priority.get(),
            "scraping job created"
        );
        Ok(job)
    }

    // -----------------------------------------------------------------------
    // update_status
    // -----------------------------------------------------------------------

    /// Moves a job through the state machine.
    ///
    /// Returns `Ok(false)` if the job does not exist or is soft-deleted. The
    /// write is conditional on the status and lease holder read just before
    /// it; a lost race is re-evaluated against the fresh record up to
    /// [`MAX_UPDATE_ATTEMPTS`] times, so a worker whose lease was reclaimed and
    /// handed on is rejected rather than overwriting the new holder's job.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidTransition`] if the move is not allowed from
    ///   the job's current status
    /// - [`PipelineError::LeaseNotHeld`] if the reporting worker lost its lease
    /// - [`PipelineError::Validation`] for a negative result count
    /// - [`PipelineError::Conflict`] if every attempt lost its race
    /// - [`PipelineError::Store`] on persistence failure
    pub async fn update_status(
        &self,
        job_id: i64,
        update: StatusUpdate,
    ) -> Result<bool, PipelineError> {
        self.update_status_at(job_id, update, Utc::now()).await
    }

    /// [`Self::update_status`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::update_status`].
    pub async fn update_status_at(
        &self,
        job_id: i64,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, PipelineError> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let Some(current) = self.store.get_job(job_id).await? else {
                tracing::warn!(job_id, status = %update.status, "status update for unknown job");
                return Ok(false);
            };

            let next = apply_status_update(&current, &update, now)?;
            if self
                .store
                .update_job_if_status(&next, current.status, current.leased_by.as_deref())
                .await?
            {
                tracing::info!(
                    job_id,
                    from = %current.status,
                    to = %next.status,
                    "job status updated"
                );
                return Ok(true);
            }

            tracing::debug!(job_id, attempt, "status or lease changed underneath update; re-reading");
        }

        Err(PipelineError::Conflict {
            job_id,
            attempts: MAX_UPDATE_ATTEMPTS,
        })
    }

    // -----------------------------------------------------------------------
    // retry_job
    // -----------------------------------------------------------------------

    /// Sends a failed job back to `pending` and bumps its retry count.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotFound`] if the job is missing or soft-deleted
    /// - [`PipelineError::InvalidTransition`] unless the job is `failed`
    /// - [`PipelineError::RetriesExhausted`] once the retry budget is spent
    /// - [`PipelineError::Conflict`] if the job changed during the retry
    /// - [`PipelineError::Store`] on persistence failure
    pub async fn retry_job(&self, job_id: i64) -> Result<Job, PipelineError> {
        self.retry_job_at(job_id, Utc::now()).await
    }

    /// [`Self::retry_job`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::retry_job`].
    pub async fn retry_job_at(&self, job_id: i64, now: DateTime<Utc>) -> Result<Job, PipelineError> {
        let current = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("job", job_id))?;

        let next = prepare_retry(&current, now)?;
        if !self
            .store
            .update_job_if_status(&next, JobStatus::Failed, current.leased_by.as_deref())
            .await?
        {
            return Err(PipelineError::Conflict {
                job_id,
                attempts: 1,
            });
        }

        tracing::info!(
            job_id,
            retry_count = next.retry_count,
            max_retries = next.max_retries,
            "failed job requeued"
        );
        Ok(next)
    }

    /// Requeues up to `limit` failed jobs that still have retry budget.
    ///
    /// A job that cannot be retried is logged and skipped; the sweep carries
    /// on with the rest.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] only if the candidate list itself
    /// cannot be read.
    pub async fn retry_failed_jobs(&self, limit: u32) -> Result<RetrySweepReport, PipelineError> {
        let candidates = self.store.retryable_failed_jobs(limit).await?;
        let mut report = RetrySweepReport::default();

        for job in candidates {
            match self.retry_job(job.id).await {
                Ok(_) => report.requeued.push(job.id),
                Err(e) => {
                    tracing::warn!(job_id = job.id, error = %e, "skipping job in retry sweep");
                    report.skipped.push((job.id, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Reads and soft delete
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the job is missing or
    /// soft-deleted.
    pub async fn get_job(&self, job_id: i64) -> Result<Job, PipelineError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("job", job_id))
    }

    /// Hides a job from every read and from scheduling.
    ///
    /// Returns `false` if the job was already deleted or never existed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on persistence failure.
    pub async fn soft_delete_job(&self, job_id: i64, actor: Uuid) -> Result<bool, PipelineError> {
        let deleted = self.store.soft_delete_job(job_id, actor, Utc::now()).await?;
        if deleted {
            tracing::info!(job_id, %actor, "job soft-deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
#[path = "lifecycle_test.rs"]
mod tests;
