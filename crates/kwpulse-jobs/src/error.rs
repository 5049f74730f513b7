use kwpulse_core::JobStatus;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("job {job_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("caller {caller} does not own keyword {keyword_id}")]
    Unauthorized { caller: Uuid, keyword_id: i64 },

    #[error("rate limit exceeded for {operation}: at most {limit} per hour")]
    RateLimitExceeded { operation: String, limit: u32 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("job {job_id} has used all {max_retries} retries")]
    RetriesExhausted { job_id: i64, max_retries: i32 },

    /// A worker reported on a job whose lease it does not hold.
    #[error("worker {worker_id} does not hold the lease on job {job_id}")]
    LeaseNotHeld { job_id: i64, worker_id: String },

    /// The conditional write kept losing to concurrent updates.
    #[error("job {job_id} changed concurrently {attempts} times in a row")]
    Conflict { job_id: i64, attempts: u32 },

    #[error("computation failed for {subject}: {reason}")]
    Computation { subject: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
