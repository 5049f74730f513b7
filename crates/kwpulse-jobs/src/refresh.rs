//! Refreshing the derived datasets.
//!
//! Every dataset refreshes independently: one failing leaves the others
//! untouched, and the report says which succeeded. Each dataset carries its
//! own async mutex, so a refresh requested while one is already running waits
//! for it and then runs again instead of overlapping.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Mutex;

use crate::error::PipelineError;
use crate::store::Store;
use crate::trend::TrendComputer;

pub const KEYWORD_TRENDS: &str = "keyword_trends";
pub const CATEGORY_ROLLUPS: &str = "category_rollups";

/// A dataset fully recomputed from primary data on each refresh.
#[async_trait]
pub trait DerivedDataset: Send + Sync {
    fn name(&self) -> &str;

    /// Rebuilds the dataset and returns its row count.
    async fn refresh(&self, now: DateTime<Utc>) -> Result<u64, PipelineError>;
}

// ---------------------------------------------------------------------------
// Built-in datasets
// ---------------------------------------------------------------------------

pub struct TrendDataset<S: ?Sized> {
    computer: TrendComputer<S>,
}

impl<S: Store + ?Sized> TrendDataset<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            computer: TrendComputer::new(store),
        }
    }
}

#[async_trait]
impl<S: Store + ?Sized> DerivedDataset for TrendDataset<S> {
    fn name(&self) -> &str {
        KEYWORD_TRENDS
    }

    async fn refresh(&self, now: DateTime<Utc>) -> Result<u64, PipelineError> {
        self.computer.refresh_at(now).await
    }
}

pub struct CategoryRollupDataset<S: ?Sized> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> CategoryRollupDataset<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store + ?Sized> DerivedDataset for CategoryRollupDataset<S> {
    fn name(&self) -> &str {
        CATEGORY_ROLLUPS
    }

    async fn refresh(&self, now: DateTime<Utc>) -> Result<u64, PipelineError> {
        Ok(self.store.refresh_category_rollups(now).await?)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    Succeeded { rows: u64 },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetOutcome {
    pub dataset: String,
    pub status: RefreshStatus,
    pub duration: Duration,
}

impl DatasetOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self.status, RefreshStatus::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub outcomes: Vec<DatasetOutcome>,
}

impl RefreshReport {
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(DatasetOutcome::succeeded)
    }

    #[must_use]
    pub fn outcome(&self, dataset: &str) -> Option<&DatasetOutcome> {
        self.outcomes.iter().find(|o| o.dataset == dataset)
    }

    pub fn failed(&self) -> impl Iterator<Item = &DatasetOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }
}

// ---------------------------------------------------------------------------
// Refresher
// ---------------------------------------------------------------------------

struct Registered {
    dataset: Arc<dyn DerivedDataset>,
    in_flight: Mutex<()>,
}

#[derive(Default)]
pub struct ViewRefresher {
    datasets: Vec<Registered>,
}

impl ViewRefresher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A refresher over the keyword trend and category rollup datasets.
    pub fn with_defaults<S: Store + ?Sized + 'static>(store: &Arc<S>) -> Self {
        Self::new()
            .register(Arc::new(TrendDataset::new(Arc::clone(store))))
            .register(Arc::new(CategoryRollupDataset::new(Arc::clone(store))))
    }

    #[must_use]
    pub fn register(mut self, dataset: Arc<dyn DerivedDataset>) -> Self {
        self.datasets.push(Registered {
            dataset,
            in_flight: Mutex::new(()),
        });
        self
    }

    pub fn dataset_names(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(|r| r.dataset.name())
    }

    /// Refreshes every dataset concurrently.
    pub async fn refresh_all(&self) -> RefreshReport {
        self.refresh_all_at(Utc::now()).await
    }

    /// [`Self::refresh_all`] against an explicit clock.
    pub async fn refresh_all_at(&self, now: DateTime<Utc>) -> RefreshReport {
        let outcomes = join_all(self.datasets.iter().map(|entry| run(entry, now))).await;
        let report = RefreshReport { outcomes };

        let failed = report.failed().count();
        if failed == 0 {
            tracing::info!(datasets = report.outcomes.len(), "derived datasets refreshed");
        } else {
            tracing::warn!(
                datasets = report.outcomes.len(),
                failed,
                "derived dataset refresh finished with failures"
            );
        }
        report
    }

    /// Refreshes one dataset by name.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if no dataset has that name. A
    /// failed refresh is reported in the outcome, not as an error.
    pub async fn refresh_one(&self, name: &str) -> Result<DatasetOutcome, PipelineError> {
        self.refresh_one_at(name, Utc::now()).await
    }

    /// [`Self::refresh_one`] against an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::refresh_one`].
    pub async fn refresh_one_at(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<DatasetOutcome, PipelineError> {
        let entry = self
            .datasets
            .iter()
            .find(|r| r.dataset.name() == name)
            .ok_or_else(|| PipelineError::not_found("dataset", name))?;
        Ok(run(entry, now).await)
    }
}

async fn run(entry: &Registered, now: DateTime<Utc>) -> DatasetOutcome {
    let name = entry.dataset.name().to_string();
    let _guard = entry.in_flight.lock().await;
    let started = Instant::now();

    let status = match entry.dataset.refresh(now).await {
        Ok(rows) => {
            tracing::info!(dataset = %name, rows, "dataset refreshed");
            RefreshStatus::Succeeded { rows }
        }
        Err(e) => {
            tracing::error!(dataset = %name, error = %e, "dataset refresh failed");
            RefreshStatus::Failed {
                error: e.to_string(),
            }
        }
    };

    DatasetOutcome {
        dataset: name,
        status,
        duration: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    struct Broken;

    #[async_trait]
    impl DerivedDataset for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn refresh(&self, _now: DateTime<Utc>) -> Result<u64, PipelineError> {
            Err(PipelineError::Computation {
                subject: "broken".to_string(),
                reason: "source table missing".to_string(),
            })
        }
    }

    /// Records the peak number of refreshes running at once.
    struct Slow {
        running: AtomicU32,
        peak: AtomicU32,
    }

    #[async_trait]
    impl DerivedDataset for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn refresh(&self, _now: DateTime<Utc>) -> Result<u64, PipelineError> {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(1)
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_others() {
        let store = Arc::new(MemoryStore::new());
        store.add_keyword(Uuid::new_v4(), "oolong", Some("tea"));
        let refresher = ViewRefresher::with_defaults(&store).register(Arc::new(Broken));

        let report = refresher.refresh_all().await;

        assert_eq!(report.outcomes.len(), 3);
        assert!(!report.all_succeeded());
        assert!(report.outcome(KEYWORD_TRENDS).unwrap().succeeded());
        assert!(report.outcome(CATEGORY_ROLLUPS).unwrap().succeeded());
        assert!(matches!(
            report.outcome("broken").unwrap().status,
            RefreshStatus::Failed { .. }
        ));
        assert_eq!(store.category_rollups().len(), 1);
    }

    #[tokio::test]
    async fn unknown_dataset_is_not_found() {
        let refresher = ViewRefresher::new();
        let err = refresher.refresh_one("nope").await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { entity: "dataset", .. }));
    }

    #[tokio::test]
    async fn overlapping_refreshes_of_one_dataset_queue() {
        let slow = Arc::new(Slow {
            running: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        });
        let as_dataset: Arc<dyn DerivedDataset> = slow.clone();
        let refresher = ViewRefresher::new().register(as_dataset);

        let (a, b) = tokio::join!(refresher.refresh_one("slow"), refresher.refresh_one("slow"));

        assert!(a.unwrap().succeeded());
        assert!(b.unwrap().succeeded());
        assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
    }
}
