pub mod analytics;
pub mod app_config;
pub mod config;
pub mod jobs;
pub mod keywords;
pub mod operations;

use thiserror::Error;

pub use analytics::{
    AnalyticsPeriod, CategoryRollup, PeriodKey, PeriodMetrics, PeriodType, TrendRecord,
    WindowSnapshot,
};
pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use jobs::{Job, JobStatus, JobType, NewJob, Priority};
pub use keywords::{Keyword, KeywordAssignment, TargetKind};
pub use operations::OperationType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid job type: {0}")]
    InvalidJobType(String),
    #[error("invalid job status: {0}")]
    InvalidJobStatus(String),
    #[error("priority must be between 1 and 10, got {0}")]
    InvalidPriority(i64),
    #[error("invalid period type: {0}")]
    InvalidPeriodType(String),
    #[error("invalid assignment target kind: {0}")]
    InvalidTargetKind(String),
}
