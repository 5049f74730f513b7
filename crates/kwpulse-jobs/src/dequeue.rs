//! Leasing pending jobs to workers.
//!
//! A lease is a non-blocking claim: the dequeuer reads a small batch of
//! candidates in priority order and tries to claim each in turn. A candidate
//! another worker got to first is skipped, never waited on.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use kwpulse_core::{AppConfig, Job};

use crate::error::PipelineError;
use crate::store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseConfig {
    /// How long a claimed job stays `queued` before it may be reclaimed.
    pub ttl: Duration,
    /// Candidates read per round.
    pub candidate_batch: u32,
    /// Rounds attempted before reporting that nothing could be claimed.
    pub max_rounds: u32,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(300),
            candidate_batch: 8,
            max_rounds: 3,
        }
    }
}

impl LeaseConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            ttl: Duration::seconds(i64::try_from(config.lease_ttl_secs).unwrap_or(i64::MAX)),
            candidate_batch: config.lease_candidate_batch.max(1),
            max_rounds: config.lease_max_rounds.max(1),
        }
    }
}

pub struct Dequeuer<S: ?Sized> {
    store: Arc<S>,
    config: LeaseConfig,
}

impl<S: JobStore + ?Sized> Dequeuer<S> {
    pub fn new(store: Arc<S>, config: LeaseConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> LeaseConfig {
        self.config
    }

    /// Leases the highest-priority pending job to `worker_id`.
    ///
    /// Ordering is priority descending, then oldest `created_at`, then lowest
    /// id. Returns `Ok(None)` when nothing is pending, or when every
    /// candidate seen was taken by a competing worker.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for an empty worker id, or
    /// [`PipelineError::Store`] on persistence failure.
    pub async fn lease_next_job(&self, worker_id: &str) -> Result<Option<Job>, PipelineError> {
        self.lease_next_job_at(worker_id, Utc::now()).await
    }

    /// [`Self::lease_next_job`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::lease_next_job`].
    pub async fn lease_next_job_at(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, PipelineError> {
        if worker_id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "worker id must not be empty".to_string(),
            ));
        }

        let lease_expires_at = now + self.config.ttl;
        let mut contended = 0u32;

        for round in 1..=self.config.max_rounds {
            let candidates = self
                .store
                .pending_candidates(self.config.candidate_batch)
                .await?;
            if candidates.is_empty() {
                tracing::debug!(worker_id, round, "no pending jobs");
                return Ok(None);
            }

            for candidate in candidates {
                if let Some(job) = self
                    .store
                    .try_claim(candidate.id, worker_id, lease_expires_at, now)
                    .await?
                {
                    tracing::info!(
                        job_id = job.id,
                        worker_id,
                        priority = job.priority.get(),
                        %lease_expires_at,
                        "job leased"
                    );
                    return Ok(Some(job));
                }
                contended += 1;
            }
        }

        tracing::warn!(
            worker_id,
            contended,
            rounds = self.config.max_rounds,
            "every pending candidate was claimed by another worker"
        );
        Ok(None)
    }

    /// Returns jobs whose lease expired without the worker reporting back to
    /// `pending`, making them leasable again.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on persistence failure.
    pub async fn reclaim_expired_leases(&self) -> Result<u64, PipelineError> {
        self.reclaim_expired_leases_at(Utc::now()).await
    }

    /// [`Self::reclaim_expired_leases`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on persistence failure.
    pub async fn reclaim_expired_leases_at(&self, now: DateTime<Utc>) -> Result<u64, PipelineError> {
        let reclaimed = self.store.reclaim_expired_leases(now).await?;
        if reclaimed > 0 {
            tracing::info!(reclaimed, "expired leases returned to pending");
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use kwpulse_core::{JobStatus, JobType, NewJob, Priority};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap()
    }

    async fn seed(store: &MemoryStore, priority: i64, created_at: DateTime<Utc>) -> Job {
        let owner = Uuid::new_v4();
        store
            .insert_job(
                NewJob {
                    keyword_id: 1,
                    job_type: JobType::Maps,
                    priority: Priority::new(priority).unwrap(),
                    owner_id: owner,
                    created_by: owner,
                    job_config: serde_json::json!({}),
                    expected_results: None,
                    estimated_duration_secs: None,
                    max_retries: 3,
                },
                created_at,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_queue_yields_none() {
        let dequeuer = Dequeuer::new(Arc::new(MemoryStore::new()), LeaseConfig::default());
        assert!(dequeuer.lease_next_job_at("w1", t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lease_marks_job_queued_with_expiry() {
        let store = Arc::new(MemoryStore::new());
        let job = seed(&store, 5, t0()).await;
        let dequeuer = Dequeuer::new(Arc::clone(&store), LeaseConfig::default());

        let leased = dequeuer.lease_next_job_at("w1", t0()).await.unwrap().unwrap();

        assert_eq!(leased.id, job.id);
        assert_eq!(leased.status, JobStatus::Queued);
        assert_eq!(leased.leased_by.as_deref(), Some("w1"));
        assert_eq!(leased.lease_expires_at, Some(t0() + Duration::seconds(300)));
        assert!(dequeuer.lease_next_job_at("w2", t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimed_and_leasable_again() {
        let store = Arc::new(MemoryStore::new());
        let job = seed(&store, 5, t0()).await;
        let dequeuer = Dequeuer::new(Arc::clone(&store), LeaseConfig::default());
        dequeuer.lease_next_job_at("w1", t0()).await.unwrap().unwrap();

        let early = dequeuer
            .reclaim_expired_leases_at(t0() + Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(early, 0, "live lease must survive");

        let late = dequeuer
            .reclaim_expired_leases_at(t0() + Duration::seconds(301))
            .await
            .unwrap();
        assert_eq!(late, 1);

        let again = dequeuer
            .lease_next_job_at("w2", t0() + Duration::seconds(302))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.leased_by.as_deref(), Some("w2"));
    }

    #[tokio::test]
    async fn blank_worker_id_is_rejected() {
        let dequeuer = Dequeuer::new(Arc::new(MemoryStore::new()), LeaseConfig::default());
        let err = dequeuer.lease_next_job_at("  ", t0()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}
