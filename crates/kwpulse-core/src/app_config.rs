#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub lease_ttl_secs: u64,
    pub lease_candidate_batch: u32,
    pub lease_max_rounds: u32,
    pub default_max_retries: i32,
    pub quota_scraping_job: u32,
    pub quota_bulk_assignment: u32,
    pub quota_default: u32,
    pub daily_analytics_cron: String,
    pub refresh_cron: String,
    pub lease_reclaim_cron: String,
    /// `None` disables the automatic retry sweep.
    pub retry_sweep_cron: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("lease_ttl_secs", &self.lease_ttl_secs)
            .field("lease_candidate_batch", &self.lease_candidate_batch)
            .field("lease_max_rounds", &self.lease_max_rounds)
            .field("default_max_retries", &self.default_max_retries)
            .field("quota_scraping_job", &self.quota_scraping_job)
            .field("quota_bulk_assignment", &self.quota_bulk_assignment)
            .field("quota_default", &self.quota_default)
            .field("daily_analytics_cron", &self.daily_analytics_cron)
            .field("refresh_cron", &self.refresh_cron)
            .field("lease_reclaim_cron", &self.lease_reclaim_cron)
            .field("retry_sweep_cron", &self.retry_sweep_cron)
            .finish()
    }
}
