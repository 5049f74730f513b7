//! Scraping job value types and the job status state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::CoreError;

/// The external provider a scraping job targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Social,
    Maps,
    Search,
    Reviews,
    Custom,
}

impl JobType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Social => "social",
            JobType::Maps => "maps",
            JobType::Search => "search",
            JobType::Reviews => "reviews",
            JobType::Custom => "custom",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "social" => Ok(JobType::Social),
            "maps" => Ok(JobType::Maps),
            "search" => Ok(JobType::Search),
            "reviews" => Ok(JobType::Reviews),
            "custom" => Ok(JobType::Custom),
            other => Err(CoreError::InvalidJobType(other.to_string())),
        }
    }
}

/// Status of a scraping job.
///
/// ```text
/// pending -> queued -> running -> completed | failed | cancelled
/// pending -> cancelled
/// queued  -> cancelled
/// queued  -> pending      (lease released or expired)
/// ```
///
/// Re-enqueueing a `failed` job goes through the retry path, not through a
/// plain status update, so `failed -> pending` is not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns `true` if a status update from `self` to `next` is allowed.
    ///
    /// `running -> running` is accepted so workers can report progress
    /// (`results_count`, partial `job_results`) without changing state.
    /// `pending -> queued` is not a status update: a job only becomes queued
    /// when a worker claims its lease.
    #[must_use]
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::{Cancelled, Completed, Failed, Pending, Queued, Running};

        matches!(
            (self, next),
            (Pending, Cancelled)
                | (Queued, Running | Pending | Cancelled)
                | (Running, Running | Completed | Failed | Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(CoreError::InvalidJobStatus(other.to_string())),
        }
    }
}

/// Scheduling priority in `1..=10`. Larger values are leased first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i16")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(1);
    pub const MAX: Priority = Priority(10);

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPriority`] if `value` is outside `1..=10`.
    pub fn new(value: i64) -> Result<Self, CoreError> {
        match u8::try_from(value) {
            Ok(v) if (1..=10).contains(&v) => Ok(Priority(v)),
            _ => Err(CoreError::InvalidPriority(value)),
        }
    }

    /// Clamps any integer into the valid range.
    #[must_use]
    pub fn saturating(value: i64) -> Self {
        let clamped = value.clamp(1, 10);
        // clamped is in 1..=10
        Priority(u8::try_from(clamped).unwrap_or(5))
    }

    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority(5)
    }
}

impl TryFrom<i64> for Priority {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Priority::new(value)
    }
}

impl From<Priority> for i16 {
    fn from(p: Priority) -> Self {
        i16::from(p.0)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scraping job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub public_id: Uuid,
    pub keyword_id: i64,
    pub job_type: JobType,
    pub priority: Priority,
    pub status: JobStatus,
    pub results_count: i32,
    pub expected_results: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_duration_secs: Option<i64>,
    pub actual_duration_secs: Option<i64>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Caller-supplied provider parameters; interpreted by the worker.
    pub job_config: Value,
    /// Provider summary payload reported by the worker.
    pub job_results: Option<Value>,
    pub owner_id: Uuid,
    pub created_by: Uuid,
    pub updated_by: Option<Uuid>,
    pub leased_by: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Returns `true` if another retry is allowed once this job has failed.
    #[must_use]
    pub fn has_retry_budget(&self) -> bool {
        self.retry_count < self.max_retries
    }

    #[must_use]
    pub fn lease_is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Queued && self.lease_expires_at.is_some_and(|exp| exp > now)
    }
}

/// Insert payload for a new `pending` job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub keyword_id: i64,
    pub job_type: JobType,
    pub priority: Priority,
    pub owner_id: Uuid,
    pub created_by: Uuid,
    pub job_config: Value,
    pub expected_results: Option<i32>,
    pub estimated_duration_secs: Option<i64>,
    pub max_retries: i32,
}
