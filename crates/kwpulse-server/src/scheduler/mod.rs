//! Background job scheduler.
//!
//! Registers the recurring pipeline work on a [`JobScheduler`]: the nightly
//! analytics batch, derived dataset refreshes, expired-lease reclaim and the
//! optional failed-job retry sweep.

mod analytics;
mod queue;

use std::sync::Arc;

use kwpulse_core::AppConfig;
use kwpulse_jobs::{Pipeline, Store};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive for
/// the lifetime of the process. Dropping it shuts down all scheduled jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, a
/// cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler<S: Store + 'static>(
    pipeline: Arc<Pipeline<S>>,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    for job in jobs(&pipeline, &config)? {
        scheduler.add(job).await?;
    }

    scheduler.start().await?;
    Ok(scheduler)
}

/// The cron jobs the server registers for `config`.
fn jobs<S: Store + 'static>(
    pipeline: &Arc<Pipeline<S>>,
    config: &AppConfig,
) -> Result<Vec<Job>, JobSchedulerError> {
    let mut jobs = vec![
        analytics::daily_analytics_job(&config.daily_analytics_cron, Arc::clone(pipeline))?,
        analytics::refresh_job(&config.refresh_cron, Arc::clone(pipeline))?,
        queue::reclaim_job(&config.lease_reclaim_cron, Arc::clone(pipeline))?,
    ];

    match &config.retry_sweep_cron {
        Some(cron) => jobs.push(queue::retry_sweep_job(cron, Arc::clone(pipeline))?),
        None => tracing::info!("scheduler: retry sweep disabled"),
    }

    Ok(jobs)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use kwpulse_core::{AppConfig, Environment};
    use kwpulse_jobs::{MemoryStore, Pipeline, PipelineSettings};

    pub fn config() -> AppConfig {
        AppConfig {
            database_url: "postgres://unused".to_string(),
            env: Environment::Test,
            log_level: "debug".to_string(),
            db_max_connections: 2,
            db_min_connections: 1,
            db_acquire_timeout_secs: 1,
            lease_ttl_secs: 300,
            lease_candidate_batch: 8,
            lease_max_rounds: 3,
            default_max_retries: 3,
            quota_scraping_job: 100,
            quota_bulk_assignment: 1000,
            quota_default: 50,
            daily_analytics_cron: "0 15 0 * * *".to_string(),
            refresh_cron: "0 */15 * * * *".to_string(),
            lease_reclaim_cron: "0 * * * * *".to_string(),
            retry_sweep_cron: None,
        }
    }

    pub fn pipeline() -> (Arc<MemoryStore>, Arc<Pipeline<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(Arc::clone(&store), PipelineSettings::default());
        (store, Arc::new(pipeline))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{config, pipeline};
    use super::*;

    #[tokio::test]
    async fn retry_sweep_is_registered_only_when_configured() {
        let (_store, pipeline) = pipeline();

        let without = jobs(&pipeline, &config()).unwrap();
        assert_eq!(without.len(), 3);

        let with = jobs(
            &pipeline,
            &AppConfig {
                retry_sweep_cron: Some("0 */5 * * * *".to_string()),
                ..config()
            },
        )
        .unwrap();
        assert_eq!(with.len(), 4);
    }

    #[tokio::test]
    async fn invalid_cron_is_rejected() {
        let (_store, pipeline) = pipeline();
        let result = jobs(
            &pipeline,
            &AppConfig {
                refresh_cron: "every now and then".to_string(),
                ..config()
            },
        );
        assert!(result.is_err());
    }
}
