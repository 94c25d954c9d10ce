use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::engines::{Engines, Fetcher};
use crate::observability::Metrics;
use crate::registry::JobRegistry;
use crate::storage::StorageClient;
use crate::worker::{self, JobLauncher};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<JobRegistry>,
    pub launcher: Arc<JobLauncher>,
    pub fetcher: Arc<dyn Fetcher>,
    pub storage: Arc<StorageClient>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, engines: Engines, storage: StorageClient) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let metrics = Arc::new(Metrics::new());
        let fetcher = engines.fetcher.clone();
        let launcher = worker::build_launcher(
            &config,
            engines,
            storage.clone(),
            registry.clone(),
            metrics.clone(),
        );

        Self {
            config: Arc::new(config),
            registry,
            launcher: Arc::new(launcher),
            fetcher,
            storage: Arc::new(storage),
            metrics,
        }
    }

    pub fn stream_poll_interval(&self) -> Duration {
        self.config.jobs.stream_poll_interval()
    }
}
