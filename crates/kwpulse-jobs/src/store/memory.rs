use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use kwpulse_core::analytics::midnight_utc;
use kwpulse_core::{
    AnalyticsPeriod, CategoryRollup, Job, JobStatus, Keyword, KeywordAssignment, NewJob,
    OperationType, PeriodKey, PeriodMetrics, PeriodType, Priority, TargetKind, TrendRecord,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{AnalyticsStore, JobStore, StoreError};

const UNCATEGORIZED: &str = "uncategorized";
const ROLLUP_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    jobs: BTreeMap<i64, Job>,
    keywords: BTreeMap<i64, Keyword>,
    assignments: Vec<KeywordAssignment>,
    operations: Vec<(Uuid, String, DateTime<Utc>)>,
    periods: HashMap<PeriodKey, AnalyticsPeriod>,
    trends: Vec<TrendRecord>,
    rollups: Vec<CategoryRollup>,
    failing_keywords: HashSet<i64>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn live_job_mut(&mut self, id: i64) -> Option<&mut Job> {
        self.jobs.get_mut(&id).filter(|job| job.deleted_at.is_none())
    }

    fn live_keyword(&self, id: i64) -> Option<&Keyword> {
        self.keywords.get(&id).filter(|kw| kw.deleted_at.is_none())
    }

    fn check_keyword_readable(&self, keyword_id: i64) -> Result<(), StoreError> {
        if self.failing_keywords.contains(&keyword_id) {
            return Err(StoreError::Backend(format!(
                "injected read failure for keyword {keyword_id}"
            )));
        }
        Ok(())
    }
}

/// In-process store with the same observable semantics as [`super::PgStore`].
///
/// A single mutex guards all state and is never held across an `.await`, so
/// every trait method is atomic with respect to the others. That makes
/// `try_claim` a true compare-and-set even under concurrent callers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Seeding helpers
    // -----------------------------------------------------------------------

    /// Adds an active keyword with default priority.
    pub fn add_keyword(&self, owner_id: Uuid, term: &str, category: Option<&str>) -> Keyword {
        let now = Utc::now();
        let mut state = self.lock();
        let id = state.next_id();
        let keyword = Keyword {
            id,
            public_id: Uuid::new_v4(),
            owner_id,
            term: term.to_string(),
            category: category.map(str::to_string),
            priority: Priority::default(),
            is_active: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.keywords.insert(id, keyword.clone());
        keyword
    }

    pub fn set_keyword_active(&self, keyword_id: i64, active: bool) {
        if let Some(kw) = self.lock().keywords.get_mut(&keyword_id) {
            kw.is_active = active;
        }
    }

    pub fn soft_delete_keyword(&self, keyword_id: i64) {
        if let Some(kw) = self.lock().keywords.get_mut(&keyword_id) {
            kw.deleted_at = Some(Utc::now());
        }
    }

    /// Reads the keyword regardless of its deleted state.
    #[must_use]
    pub fn keyword(&self, keyword_id: i64) -> Option<Keyword> {
        self.lock().keywords.get(&keyword_id).cloned()
    }

    pub fn add_assignment(
        &self,
        keyword_id: i64,
        target_kind: TargetKind,
        engagement: i64,
        rating: Option<Decimal>,
        created_by: Uuid,
        created_at: DateTime<Utc>,
    ) -> KeywordAssignment {
        let mut state = self.lock();
        let id = state.next_id();
        let assignment = KeywordAssignment {
            id,
            keyword_id,
            target_kind,
            engagement,
            rating,
            created_by,
            deleted_at: None,
            created_at,
        };
        state.assignments.push(assignment.clone());
        assignment
    }

    /// Stores a job exactly as given, bypassing the lifecycle rules. The id is
    /// reassigned and returned.
    pub fn put_job(&self, mut job: Job) -> i64 {
        let mut state = self.lock();
        let id = state.next_id();
        job.id = id;
        state.jobs.insert(id, job);
        id
    }

    /// Reads a job regardless of its deleted state.
    #[must_use]
    pub fn raw_job(&self, id: i64) -> Option<Job> {
        self.lock().jobs.get(&id).cloned()
    }

    #[must_use]
    pub fn jobs(&self) -> Vec<Job> {
        self.lock().jobs.values().cloned().collect()
    }

    #[must_use]
    pub fn category_rollups(&self) -> Vec<CategoryRollup> {
        self.lock().rollups.clone()
    }

    /// Makes every job and assignment read for `keyword_id` fail.
    pub fn fail_reads_for_keyword(&self, keyword_id: i64) {
        self.lock().failing_keywords.insert(keyword_id);
    }
}

fn within(at: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    at >= start && at <= end
}

fn build_rollups(state: &State, now: DateTime<Utc>) -> Vec<CategoryRollup> {
    let window_start = midnight_utc(now.date_naive()) - Duration::days(ROLLUP_WINDOW_DAYS);
    let mut groups: BTreeMap<(Uuid, String), CategoryRollup> = BTreeMap::new();

    for keyword in state
        .keywords
        .values()
        .filter(|kw| kw.is_active && kw.deleted_at.is_none())
    {
        let category = keyword
            .category
            .clone()
            .unwrap_or_else(|| UNCATEGORIZED.to_string());
        let entry = groups
            .entry((keyword.owner_id, category.clone()))
            .or_insert_with(|| CategoryRollup {
                owner_id: keyword.owner_id,
                category,
                keyword_count: 0,
                total_engagement: 0,
                total_jobs: 0,
                completed_jobs: 0,
            });
        entry.keyword_count += 1;

        for period in state.periods.values().filter(|p| {
            p.key.keyword_id == keyword.id
                && p.key.period_type == PeriodType::Daily
                && p.key.period_start >= window_start
        }) {
            entry.total_engagement += period.metrics.total_engagement;
            entry.total_jobs += i64::from(period.metrics.total_jobs);
            entry.completed_jobs += i64::from(period.metrics.completed_jobs);
        }
    }

    groups.into_values().collect()
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: NewJob, now: DateTime<Utc>) -> Result<Job, StoreError> {
        let mut state = self.lock();
        let id = state.next_id();
        let job = Job {
            id,
            public_id: Uuid::new_v4(),
            keyword_id: job.keyword_id,
            job_type: job.job_type,
            priority: job.priority,
            status: JobStatus::Pending,
            results_count: 0,
            expected_results: job.expected_results,
            started_at: None,
            completed_at: None,
            estimated_duration_secs: job.estimated_duration_secs,
            actual_duration_secs: None,
            error_message: None,
            error_code: None,
            retry_count: 0,
            max_retries: job.max_retries,
            job_config: job.job_config,
            job_results: None,
            owner_id: job.owner_id,
            created_by: job.created_by,
            updated_by: None,
            leased_by: None,
            lease_expires_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: i64) -> Result<Option<Job>, StoreError> {
        Ok(self
            .lock()
            .jobs
            .get(&id)
            .filter(|job| job.deleted_at.is_none())
            .cloned())
    }

    async fn update_job_if_status(
        &self,
        job: &Job,
        expected: JobStatus,
        expected_lease: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let Some(stored) = state.live_job_mut(job.id) else {
            return Ok(false);
        };
        if stored.status != expected || stored.leased_by.as_deref() != expected_lease {
            return Ok(false);
        }

        stored.status = job.status;
        stored.results_count = job.results_count;
        stored.started_at = job.started_at;
        stored.completed_at = job.completed_at;
        stored.actual_duration_secs = job.actual_duration_secs;
        stored.error_message.clone_from(&job.error_message);
        stored.error_code.clone_from(&job.error_code);
        stored.job_results.clone_from(&job.job_results);
        stored.retry_count = job.retry_count;
        stored.leased_by.clone_from(&job.leased_by);
        stored.lease_expires_at = job.lease_expires_at;
        stored.updated_by = job.updated_by;
        stored.updated_at = job.updated_at;
        Ok(true)
    }

    async fn pending_candidates(&self, limit: u32) -> Result<Vec<Job>, StoreError> {
        let state = self.lock();
        let mut pending: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.deleted_at.is_none() && job.status == JobStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        pending.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(pending)
    }

    async fn try_claim(
        &self,
        id: i64,
        worker_id: &str,
        lease_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        let mut state = self.lock();
        let Some(job) = state.live_job_mut(id) else {
            return Ok(None);
        };
        if job.status != JobStatus::Pending {
            return Ok(None);
        }
        job.status = JobStatus::Queued;
        job.leased_by = Some(worker_id.to_string());
        job.lease_expires_at = Some(lease_expires_at);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.lock();
        let mut reclaimed = 0;
        for job in state.jobs.values_mut().filter(|job| {
            job.deleted_at.is_none()
                && job.status == JobStatus::Queued
                && job.lease_expires_at.is_some_and(|exp| exp < now)
        }) {
            job.status = JobStatus::Pending;
            job.leased_by = None;
            job.lease_expires_at = None;
            job.updated_at = now;
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    async fn soft_delete_job(
        &self,
        id: i64,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let Some(job) = state.live_job_mut(id) else {
            return Ok(false);
        };
        job.deleted_at = Some(now);
        job.updated_by = Some(actor);
        job.updated_at = now;
        Ok(true)
    }

    async fn retryable_failed_jobs(&self, limit: u32) -> Result<Vec<Job>, StoreError> {
        let state = self.lock();
        let mut failed: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| {
                job.deleted_at.is_none()
                    && job.status == JobStatus::Failed
                    && job.has_retry_budget()
            })
            .cloned()
            .collect();
        failed.sort_by(|a, b| a.completed_at.cmp(&b.completed_at).then(a.id.cmp(&b.id)));
        failed.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(failed)
    }

    async fn jobs_for_keyword_between(
        &self,
        keyword_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError> {
        let state = self.lock();
        state.check_keyword_readable(keyword_id)?;
        Ok(state
            .jobs
            .values()
            .filter(|job| {
                job.deleted_at.is_none()
                    && job.keyword_id == keyword_id
                    && within(job.created_at, start, end)
            })
            .cloned()
            .collect())
    }

    async fn get_keyword(&self, id: i64) -> Result<Option<Keyword>, StoreError> {
        Ok(self.lock().live_keyword(id).cloned())
    }

    async fn active_keywords(&self) -> Result<Vec<Keyword>, StoreError> {
        Ok(self
            .lock()
            .keywords
            .values()
            .filter(|kw| kw.is_active && kw.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn set_keyword_priority(
        &self,
        keyword_id: i64,
        priority: Priority,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let Some(keyword) = state
            .keywords
            .get_mut(&keyword_id)
            .filter(|kw| kw.deleted_at.is_none())
        else {
            return Ok(false);
        };
        if keyword.priority == priority {
            return Ok(false);
        }
        keyword.priority = priority;
        keyword.updated_at = Utc::now();
        Ok(true)
    }

    async fn assignments_for_keyword_between(
        &self,
        keyword_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<KeywordAssignment>, StoreError> {
        let state = self.lock();
        state.check_keyword_readable(keyword_id)?;
        Ok(state
            .assignments
            .iter()
            .filter(|a| {
                a.deleted_at.is_none()
                    && a.keyword_id == keyword_id
                    && within(a.created_at, start, end)
            })
            .cloned()
            .collect())
    }

    async fn count_operations_since(
        &self,
        caller: Uuid,
        operation: &OperationType,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.lock();
        let count = match operation {
            OperationType::ScrapingJob => state
                .jobs
                .values()
                .filter(|job| job.created_by == caller && job.created_at >= since)
                .count(),
            OperationType::BulkAssignment => state
                .assignments
                .iter()
                .filter(|a| a.created_by == caller && a.created_at >= since)
                .count(),
            OperationType::Other(name) => state
                .operations
                .iter()
                .filter(|(who, op, at)| *who == caller && op == name && *at >= since)
                .count(),
        };
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn record_operation(
        &self,
        caller: Uuid,
        operation: &OperationType,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let OperationType::Other(name) = operation {
            self.lock().operations.push((caller, name.clone(), at));
        }
        Ok(())
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn upsert_period(
        &self,
        key: &PeriodKey,
        metrics: &PeriodMetrics,
        owner_id: Uuid,
        actor: Option<Uuid>,
        computed_at: DateTime<Utc>,
    ) -> Result<AnalyticsPeriod, StoreError> {
        let mut state = self.lock();
        let (id, created_by) = match state.periods.get(key) {
            Some(existing) => (existing.id, existing.created_by),
            None => (state.next_id(), actor),
        };
        let period = AnalyticsPeriod {
            id,
            key: *key,
            metrics: metrics.clone(),
            owner_id,
            created_by,
            updated_by: actor,
            computed_at,
        };
        state.periods.insert(*key, period.clone());
        Ok(period)
    }

    async fn get_period(&self, key: &PeriodKey) -> Result<Option<AnalyticsPeriod>, StoreError> {
        Ok(self.lock().periods.get(key).cloned())
    }

    async fn daily_periods_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsPeriod>, StoreError> {
        let state = self.lock();
        let mut periods: Vec<AnalyticsPeriod> = state
            .periods
            .values()
            .filter(|p| {
                p.key.period_type == PeriodType::Daily
                    && p.key.period_start >= start
                    && p.key.period_start < end
                    && state.live_keyword(p.key.keyword_id).is_some()
            })
            .cloned()
            .collect();
        periods.sort_by_key(|p| (p.key.keyword_id, p.key.period_start));
        Ok(periods)
    }

    async fn replace_trends(&self, records: Vec<TrendRecord>) -> Result<u64, StoreError> {
        let written = u64::try_from(records.len()).unwrap_or(u64::MAX);
        self.lock().trends = records;
        Ok(written)
    }

    async fn trends(&self, limit: u32) -> Result<Vec<TrendRecord>, StoreError> {
        let mut trends = self.lock().trends.clone();
        trends.sort_by(|a, b| {
            b.trend_score
                .total_cmp(&a.trend_score)
                .then(a.keyword_id.cmp(&b.keyword_id))
        });
        trends.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(trends)
    }

    async fn refresh_category_rollups(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.lock();
        let rollups = build_rollups(&state, now);
        let count = u64::try_from(rollups.len()).unwrap_or(u64::MAX);
        state.rollups = rollups;
        Ok(count)
    }

    async fn rollups_for_owner(&self, owner_id: Uuid) -> Result<Vec<CategoryRollup>, StoreError> {
        Ok(self
            .lock()
            .rollups
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }
}
