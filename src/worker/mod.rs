//! Job execution
//!
//! [`JobLauncher`] validates submissions and registers them; each new job
//! runs on its own tokio task through the shared [`JobRunner`]. Jobs are
//! detached from the request that started them.

pub mod launcher;
pub mod runner;

pub use launcher::{JobLauncher, Submission};
pub use runner::{JobRunner, RunnerError};

use std::sync::Arc;

use crate::config::Config;
use crate::engines::Engines;
use crate::observability::Metrics;
use crate::registry::JobRegistry;
use crate::storage::StorageClient;

/// Wire a launcher from configuration
pub fn build_launcher(
    config: &Config,
    engines: Engines,
    storage: StorageClient,
    registry: Arc<JobRegistry>,
    metrics: Arc<Metrics>,
) -> JobLauncher {
    let runner = JobRunner::builder()
        .engines(engines)
        .storage(storage)
        .progress_interval(config.jobs.progress_interval())
        .metrics(metrics.clone())
        .build();

    JobLauncher::new(
        registry,
        Arc::new(runner),
        metrics,
        config.jobs.default_format_selector.clone(),
    )
}
