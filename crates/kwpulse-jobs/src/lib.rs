pub mod aggregate;
pub mod dequeue;
pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod rate_limit;
pub mod refresh;
pub mod store;
pub mod trend;

use std::sync::Arc;

use kwpulse_core::AppConfig;

pub use aggregate::{AnalyticsAggregator, BatchReport, KeywordFailure};
pub use dequeue::{Dequeuer, LeaseConfig};
pub use error::PipelineError;
pub use hooks::{KeywordPriorityHook, MetricsHook};
pub use lifecycle::{
    CreateJobRequest, JobLifecycleManager, RetrySweepReport, StatusUpdate,
};
pub use rate_limit::{QuotaConfig, RateLimiter};
pub use refresh::{DatasetOutcome, DerivedDataset, RefreshReport, RefreshStatus, ViewRefresher};
pub use store::{AnalyticsStore, JobStore, MemoryStore, PgStore, Store, StoreError};
pub use trend::TrendComputer;

/// Tunables for [`Pipeline::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub quotas: QuotaConfig,
    pub lease: LeaseConfig,
    pub default_max_retries: i32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            quotas: QuotaConfig::default(),
            lease: LeaseConfig::default(),
            default_max_retries: lifecycle::DEFAULT_MAX_RETRIES,
        }
    }
}

impl PipelineSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            quotas: QuotaConfig::from_app_config(config),
            lease: LeaseConfig::from_app_config(config),
            default_max_retries: config.default_max_retries,
        }
    }
}

/// Every pipeline component wired to one shared store.
pub struct Pipeline<S: ?Sized> {
    pub store: Arc<S>,
    pub rate_limiter: RateLimiter<S>,
    pub lifecycle: JobLifecycleManager<S>,
    pub dequeuer: Dequeuer<S>,
    pub aggregator: AnalyticsAggregator<S>,
    pub refresher: ViewRefresher,
}

impl<S: Store + 'static> Pipeline<S> {
    /// Builds the components with the keyword priority hook and the default
    /// derived datasets registered.
    pub fn new(store: Arc<S>, settings: PipelineSettings) -> Self {
        let rate_limiter = RateLimiter::new(Arc::clone(&store), settings.quotas);
        let lifecycle = JobLifecycleManager::new(Arc::clone(&store), rate_limiter.clone())
            .with_default_max_retries(settings.default_max_retries);
        let dequeuer = Dequeuer::new(Arc::clone(&store), settings.lease);
        let aggregator = AnalyticsAggregator::new(Arc::clone(&store))
            .with_hook(Arc::new(KeywordPriorityHook::new(Arc::clone(&store))));
        let refresher = ViewRefresher::with_defaults(&store);

        Self {
            store,
            rate_limiter,
            lifecycle,
            dequeuer,
            aggregator,
            refresher,
        }
    }
}

impl Pipeline<PgStore> {
    /// Builds a Postgres-backed pipeline from application config.
    #[must_use]
    pub fn postgres(pool: sqlx::PgPool, config: &AppConfig) -> Self {
        Self::new(
            Arc::new(PgStore::new(pool)),
            PipelineSettings::from_app_config(config),
        )
    }
}
