//! Queue housekeeping: expired leases and failed-job retries.

use std::sync::Arc;

use kwpulse_jobs::{Pipeline, Store};
use tokio_cron_scheduler::{Job, JobSchedulerError};

/// Failed jobs requeued per sweep.
const RETRY_SWEEP_LIMIT: u32 = 100;

/// Returns jobs whose worker never reported back to `pending`.
pub(super) fn reclaim_job<S: Store + 'static>(
    cron: &str,
    pipeline: Arc<Pipeline<S>>,
) -> Result<Job, JobSchedulerError> {
    Job::new_async(cron, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);

        Box::pin(async move {
            run_reclaim(&pipeline).await;
        })
    })
}

pub(super) fn retry_sweep_job<S: Store + 'static>(
    cron: &str,
    pipeline: Arc<Pipeline<S>>,
) -> Result<Job, JobSchedulerError> {
    Job::new_async(cron, move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);

        Box::pin(async move {
            run_retry_sweep(&pipeline).await;
        })
    })
}

pub(super) async fn run_reclaim<S: Store + 'static>(pipeline: &Pipeline<S>) -> u64 {
    match pipeline.dequeuer.reclaim_expired_leases().await {
        Ok(reclaimed) => reclaimed,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: lease reclaim failed");
            0
        }
    }
}

pub(super) async fn run_retry_sweep<S: Store + 'static>(pipeline: &Pipeline<S>) {
    match pipeline.lifecycle.retry_failed_jobs(RETRY_SWEEP_LIMIT).await {
        Ok(report) if report.requeued.is_empty() && report.skipped.is_empty() => {}
        Ok(report) => {
            tracing::info!(
                requeued = report.requeued.len(),
                skipped = report.skipped.len(),
                "scheduler: retry sweep complete"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "scheduler: retry sweep failed");
        }
    }
}
