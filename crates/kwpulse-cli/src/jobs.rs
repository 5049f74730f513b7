//! Job queue command handlers.
//!
//! Each handler prints a one-line summary; domain errors propagate to `main`
//! and end the process with a non-zero exit code.

use kwpulse_core::{Job, JobStatus, JobType, Priority};
use kwpulse_jobs::{CreateJobRequest, Pipeline, Store, StatusUpdate};
use uuid::Uuid;

/// Builds a create request from raw CLI arguments.
///
/// # Errors
///
/// Returns an error if `priority` is outside 1..=10 or `config` is not valid
/// JSON.
pub(crate) fn build_create_request(
    keyword_id: i64,
    job_type: JobType,
    priority: Option<i64>,
    config: Option<&str>,
    max_retries: Option<i32>,
) -> anyhow::Result<CreateJobRequest> {
    let mut request = CreateJobRequest::new(keyword_id, job_type);
    if let Some(p) = priority {
        request = request.with_priority(Priority::new(p)?);
    }
    if let Some(raw) = config {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("--config is not valid JSON: {e}"))?;
        request = request.with_config(value);
    }
    if let Some(n) = max_retries {
        request = request.with_max_retries(n);
    }
    Ok(request)
}

pub(crate) fn build_status_update(
    status: JobStatus,
    results: Option<i32>,
    error: Option<String>,
    error_code: Option<String>,
    actor: Option<Uuid>,
    worker: Option<String>,
) -> StatusUpdate {
    let mut update = StatusUpdate::new(status);
    if let Some(count) = results {
        update = update.with_results(count, None);
    }
    if let Some(message) = error {
        update = update.with_error(message, error_code);
    }
    if let Some(actor) = actor {
        update = update.by(actor);
    }
    if let Some(worker) = worker {
        update = update.from_worker(worker);
    }
    update
}

fn describe(job: &Job) -> String {
    format!(
        "job {} [{}] keyword={} type={} priority={} retries={}/{}",
        job.id,
        job.status,
        job.keyword_id,
        job.job_type,
        job.priority.get(),
        job.retry_count,
        job.max_retries
    )
}

/// # Errors
///
/// Returns an error if the keyword is missing, not owned by `caller`, the
/// hourly quota is spent, or the insert fails.
pub(crate) async fn run_create_job<S: Store + 'static>(
    pipeline: &Pipeline<S>,
    request: CreateJobRequest,
    caller: Uuid,
) -> anyhow::Result<()> {
    let job = pipeline.lifecycle.create_job(request, caller).await?;
    println!("created {}", describe(&job));
    Ok(())
}

/// # Errors
///
/// Returns an error if the worker id is blank or the store fails.
pub(crate) async fn run_lease<S: Store + 'static>(
    pipeline: &Pipeline<S>,
    worker: &str,
) -> anyhow::Result<()> {
    match pipeline.dequeuer.lease_next_job(worker).await? {
        Some(job) => {
            let expires = job
                .lease_expires_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            println!("leased {} until {expires}", describe(&job));
        }
        None => println!("no pending jobs"),
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the transition is not allowed or the update keeps
/// losing to concurrent writers.
pub(crate) async fn run_update_status<S: Store + 'static>(
    pipeline: &Pipeline<S>,
    job_id: i64,
    update: StatusUpdate,
) -> anyhow::Result<()> {
    let status = update.status;
    if pipeline.lifecycle.update_status(job_id, update).await? {
        println!("job {job_id} -> {status}");
    } else {
        println!("job {job_id} not found");
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the job is missing, not failed, or out of retries.
pub(crate) async fn run_retry<S: Store + 'static>(
    pipeline: &Pipeline<S>,
    job_id: i64,
) -> anyhow::Result<()> {
    let job = pipeline.lifecycle.retry_job(job_id).await?;
    println!("requeued {}", describe(&job));
    Ok(())
}

/// # Errors
///
/// Returns an error if the store fails.
pub(crate) async fn run_reclaim<S: Store + 'static>(pipeline: &Pipeline<S>) -> anyhow::Result<()> {
    let reclaimed = pipeline.dequeuer.reclaim_expired_leases().await?;
    println!("reclaimed {reclaimed} expired lease(s)");
    Ok(())
}

/// # Errors
///
/// Returns an error if the failed-job scan fails. Per-job failures are
/// printed and skipped.
pub(crate) async fn run_retry_sweep<S: Store + 'static>(
    pipeline: &Pipeline<S>,
    limit: u32,
) -> anyhow::Result<()> {
    let report = pipeline.lifecycle.retry_failed_jobs(limit).await?;
    println!(
        "requeued {} job(s), skipped {}",
        report.requeued.len(),
        report.skipped.len()
    );
    for (job_id, reason) in &report.skipped {
        println!("  job {job_id}: {reason}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kwpulse_jobs::{MemoryStore, PipelineError, PipelineSettings};
    use std::sync::Arc;

    fn pipeline() -> (Arc<MemoryStore>, Pipeline<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(Arc::clone(&store), PipelineSettings::default());
        (store, pipeline)
    }

    #[test]
    fn create_request_rejects_out_of_range_priority() {
        let err = build_create_request(1, JobType::Social, Some(11), None, None).unwrap_err();
        assert!(err.to_string().contains("priority"), "{err}");
    }

    #[test]
    fn create_request_rejects_malformed_config() {
        let err =
            build_create_request(1, JobType::Maps, None, Some("{not json"), None).unwrap_err();
        assert!(err.to_string().contains("--config"));
    }

    #[test]
    fn create_request_carries_every_option() {
        let request =
            build_create_request(7, JobType::Search, Some(8), Some(r#"{"depth":2}"#), Some(5))
                .unwrap();
        assert_eq!(request.keyword_id, 7);
        assert_eq!(request.priority.map(Priority::get), Some(8));
        assert_eq!(request.config["depth"], 2);
        assert_eq!(request.max_retries, Some(5));
    }

    #[test]
    fn error_code_needs_an_error_message() {
        let update = build_status_update(JobStatus::Failed, None, None, Some("E1".into()), None, None);
        assert!(update.error_code.is_none());

        let update = build_status_update(
            JobStatus::Failed,
            Some(3),
            Some("timeout".into()),
            Some("E1".into()),
            None,
            None,
        );
        assert_eq!(update.error_message.as_deref(), Some("timeout"));
        assert_eq!(update.error_code.as_deref(), Some("E1"));
        assert_eq!(update.results_count, Some(3));
    }

    #[tokio::test]
    async fn create_then_lease_through_handlers() {
        let (store, pipeline) = pipeline();
        let keyword = store.add_keyword(Uuid::new_v4(), "matcha", None);
        let request = build_create_request(keyword.id, JobType::Social, None, None, None).unwrap();

        run_create_job(&pipeline, request, keyword.owner_id)
            .await
            .unwrap();
        run_lease(&pipeline, "cli").await.unwrap();

        let jobs = store.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Queued);
        assert_eq!(jobs[0].leased_by.as_deref(), Some("cli"));
    }

    #[tokio::test]
    async fn retry_of_pending_job_surfaces_the_domain_error() {
        let (store, pipeline) = pipeline();
        let keyword = store.add_keyword(Uuid::new_v4(), "genmaicha", None);
        let request = build_create_request(keyword.id, JobType::Maps, None, None, None).unwrap();
        run_create_job(&pipeline, request, keyword.owner_id)
            .await
            .unwrap();
        let job_id = store.jobs()[0].id;

        let err = run_retry(&pipeline, job_id).await.unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().is_some());
    }
}
