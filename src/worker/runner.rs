//! Job runner - drives one job from fetch to published file

use bon::Builder;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engines::{AUDIO_EXTENSION, BusLogger, EngineError, Engines, FetchRequest};
use crate::observability::Metrics;
use crate::progress::{
    ProgressEvent, ProgressHook, STAGE_LOG, STAGE_TRANSCODE_COMPLETE, STAGE_TRANSCODE_START,
};
use crate::registry::{JobEntry, JobStatus, OutputFormat};
use crate::storage::{ScopedFile, StorageClient, StorageError};

/// Why a job did not complete; the display form becomes the job's
/// terminal `Error` message
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("download failed: {0}")]
    FetchFailure(#[source] EngineError),

    #[error("audio conversion failed: {0}")]
    TranscodeFailure(#[source] EngineError),

    #[error("file handling failed: {0}")]
    FilesystemFailure(String),

    #[error("download cancelled")]
    Cancelled,
}

impl RunnerError {
    /// Status a job ends in after this error
    pub fn status(&self) -> JobStatus {
        match self {
            RunnerError::Cancelled => JobStatus::Cancelled,
            _ => JobStatus::Failed,
        }
    }

    fn fetch(e: EngineError) -> Self {
        match e {
            EngineError::Cancelled => RunnerError::Cancelled,
            other => RunnerError::FetchFailure(other),
        }
    }

    fn transcode(e: EngineError) -> Self {
        match e {
            EngineError::Cancelled => RunnerError::Cancelled,
            other => RunnerError::TranscodeFailure(other),
        }
    }
}

impl From<StorageError> for RunnerError {
    fn from(e: StorageError) -> Self {
        RunnerError::FilesystemFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RunnerError>;

/// Executes jobs against the configured engines and output directory
///
/// Every intermediate file lives in a per-job staging directory and is
/// held by a drop guard, so nothing is left behind on any exit path. Only
/// the final file is moved into the output directory.
#[derive(Builder)]
pub struct JobRunner {
    engines: Engines,
    storage: StorageClient,
    /// Minimum gap between live-forwarded progress updates
    #[builder(default = Duration::from_secs(1))]
    progress_interval: Duration,
    #[builder(default)]
    metrics: Arc<Metrics>,
}

impl JobRunner {
    /// Run `job` to a terminal state and return that state
    ///
    /// Exactly one terminal event (`Complete` or `Error`) is appended to
    /// the job's bus before its status becomes terminal.
    pub async fn run(&self, job: Arc<JobEntry>) -> JobStatus {
        let key = job.key().to_string();
        info!(
            key = %key,
            url = %job.spec().url,
            format = %job.spec().format,
            selector = %job.spec().selector,
            "Job started"
        );

        match self.execute(&job).await {
            Ok(filename) => {
                if let Err(e) = job.bus().append(ProgressEvent::complete(filename.clone())) {
                    error!(key = %key, error = %e, "Terminal event already recorded");
                    job.set_status(JobStatus::Failed);
                    self.metrics.job_failed();
                } else {
                    job.complete(filename.clone());
                    self.metrics.job_completed();
                    info!(key = %key, filename = %filename, "Job completed");
                }
            }
            Err(err) => {
                let status = err.status();
                match status {
                    JobStatus::Cancelled => {
                        info!(key = %key, "Job cancelled");
                        self.metrics.job_cancelled();
                    }
                    _ => {
                        warn!(key = %key, error = %err, "Job failed");
                        self.metrics.job_failed();
                    }
                }
                if let Err(e) = job.bus().append(ProgressEvent::error(err.to_string())) {
                    debug!(key = %key, error = %e, "Terminal event already recorded");
                }
                job.set_status(status);
            }
        }

        job.status()
    }

    async fn execute(&self, job: &JobEntry) -> Result<String> {
        let spec = job.spec();
        let bus = job.bus();
        let cancel = job.cancel_token();

        if spec.url.as_str().trim().is_empty() {
            return Err(RunnerError::InvalidInput("URL is empty".to_string()));
        }
        checkpoint(cancel)?;

        let staging = self.storage.staging_dir(job.key())?;
        job.set_status(JobStatus::Downloading);
        log_to_bus(job, format!("Starting download: {}", spec.url));

        let request = FetchRequest {
            url: spec.url.to_string(),
            format_selector: spec.selector.clone(),
            output_dir: staging.path().to_path_buf(),
        };
        let mut hook = ProgressHook::new(bus.clone(), self.progress_interval);
        let logger = BusLogger::new(bus.clone());

        let fetched = self
            .engines
            .fetcher
            .fetch(&request, &mut hook, &logger, cancel)
            .await
            .map_err(RunnerError::fetch)?;

        if !fetched.path.starts_with(staging.path()) {
            return Err(RunnerError::FilesystemFailure(format!(
                "fetcher wrote outside its working directory: {}",
                fetched.path.display()
            )));
        }
        let fetched_file = ScopedFile::new(&fetched.path);
        if !tokio::fs::try_exists(fetched_file.path()).await.unwrap_or(false) {
            return Err(RunnerError::FilesystemFailure(format!(
                "fetched file is missing: {}",
                fetched.path.display()
            )));
        }
        debug!(key = job.key(), path = %fetched.path.display(), title = ?fetched.metadata.title, "Fetch finished");
        checkpoint(cancel)?;

        let needs_transcode = spec.format == OutputFormat::Audio
            && fetched.extension().as_deref() != Some(AUDIO_EXTENSION);

        let final_file = if needs_transcode {
            self.transcode(job, fetched_file).await?
        } else {
            fetched_file
        };

        checkpoint(cancel)?;
        let filename = self.storage.publish(final_file.path()).await?;
        final_file.keep();
        Ok(filename)
    }

    /// Replace `original` with its mp3 rendition; both files stay guarded
    async fn transcode(&self, job: &JobEntry, original: ScopedFile) -> Result<ScopedFile> {
        job.set_status(JobStatus::Transcoding);
        append_status(job, STAGE_TRANSCODE_START, "Converting to MP3...");

        let transcoder = &self.engines.transcoder;
        let target = ScopedFile::new(transcoder.audio_path_for(original.path()));
        let produced = transcoder
            .transcode_to_audio(original.path(), job.cancel_token())
            .await
            .map_err(RunnerError::transcode)?;

        let audio = if produced.as_path() == target.path() {
            target
        } else {
            drop(target);
            ScopedFile::new(produced)
        };

        if let Err(e) = original.remove() {
            warn!(key = job.key(), error = %e, "Failed to remove original after conversion");
        }
        append_status(job, STAGE_TRANSCODE_COMPLETE, "MP3 conversion complete");
        Ok(audio)
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(RunnerError::Cancelled);
    }
    Ok(())
}

fn append_status(job: &JobEntry, stage: &str, message: &str) {
    if let Err(e) = job.bus().append(ProgressEvent::status(stage, message)) {
        debug!(key = job.key(), stage, error = %e, "Dropping status after terminal event");
    }
}

fn log_to_bus(job: &JobEntry, message: String) {
    if let Err(e) = job.bus().append(ProgressEvent::status(STAGE_LOG, message)) {
        debug!(key = job.key(), error = %e, "Dropping log after terminal event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status() {
        assert_eq!(RunnerError::Cancelled.status(), JobStatus::Cancelled);
        assert_eq!(
            RunnerError::fetch(EngineError::Fetch("x".into())).status(),
            JobStatus::Failed
        );
        assert!(matches!(
            RunnerError::transcode(EngineError::Cancelled),
            RunnerError::Cancelled
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(RunnerError::Cancelled.to_string(), "download cancelled");
        assert_eq!(
            RunnerError::fetch(EngineError::Fetch("ERROR: Video unavailable".into())).to_string(),
            "download failed: ERROR: Video unavailable"
        );
    }
}
