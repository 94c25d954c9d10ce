//! Job submission: validate, register, and start runners in the background

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::runner::{JobRunner, RunnerError};
use crate::observability::Metrics;
use crate::progress::ProgressEvent;
use crate::registry::{JobEntry, JobRegistry, JobSpec, JobStatus, OutputFormat};

/// Outcome of a submission
pub struct Submission {
    pub job: Arc<JobEntry>,
    /// False when an in-flight job with the same key was joined
    pub created: bool,
    /// Supervisor task of a newly started job
    pub handle: Option<JoinHandle<()>>,
}

pub struct JobLauncher {
    registry: Arc<JobRegistry>,
    runner: Arc<JobRunner>,
    metrics: Arc<Metrics>,
    default_selector: String,
}

impl JobLauncher {
    pub fn new(
        registry: Arc<JobRegistry>,
        runner: Arc<JobRunner>,
        metrics: Arc<Metrics>,
        default_selector: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            runner,
            metrics,
            default_selector: default_selector.into(),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Validate a request and start (or join) its job
    ///
    /// Invalid input is rejected before anything is registered, so no job
    /// and no progress bus exist for it.
    pub fn submit(
        &self,
        url: &str,
        format: Option<&str>,
        format_id: Option<&str>,
    ) -> Result<Submission, RunnerError> {
        if url.trim().is_empty() {
            return Err(RunnerError::InvalidInput("URL is required".to_string()));
        }

        let format = match format.map(str::trim).filter(|f| !f.is_empty()) {
            Some(raw) => raw
                .parse::<OutputFormat>()
                .map_err(|e| RunnerError::InvalidInput(e.to_string()))?,
            None => OutputFormat::default(),
        };
        let selector = format_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.default_selector);

        let spec = JobSpec::new(url, format, selector)
            .map_err(|e| RunnerError::InvalidInput(e.to_string()))?;

        let (job, created) = self.registry.get_or_create(spec);
        if !created {
            return Ok(Submission {
                job,
                created,
                handle: None,
            });
        }

        self.metrics.job_submitted();
        info!(key = job.key(), url = %job.spec().url, format = %format, "Job submitted");
        let handle = self.spawn(job.clone());
        Ok(Submission {
            job,
            created,
            handle: Some(handle),
        })
    }

    /// Run the job on its own task; a second task turns a panic into a
    /// terminal `Error` so listeners never wait forever
    fn spawn(&self, job: Arc<JobEntry>) -> JoinHandle<()> {
        let runner = self.runner.clone();
        let metrics = self.metrics.clone();

        let task = {
            let job = job.clone();
            tokio::spawn(async move { runner.run(job).await })
        };

        tokio::spawn(async move {
            if let Err(e) = task.await {
                error!(key = job.key(), error = %e, "Job task aborted");
                if job.bus().append(ProgressEvent::error("internal error")).is_ok() {
                    metrics.job_failed();
                }
                job.set_status(JobStatus::Failed);
            }
        })
    }
}
