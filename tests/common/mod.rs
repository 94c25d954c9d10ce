//! Shared fakes for integration tests: in-process fetcher and transcoder

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use mediabox::engines::{
    EngineError, Engines, FetchLogger, FetchOutput, FetchRequest, Fetcher, FormatOption,
    MediaInfo, MediaMetadata, Transcoder,
};
use mediabox::observability::Metrics;
use mediabox::progress::{ProgressHook, RawProgress};
use mediabox::registry::{JobEntry, JobRegistry};
use mediabox::storage::{STAGING_DIR, StorageClient};
use mediabox::worker::{JobLauncher, JobRunner};

/// How the fake fetcher behaves
#[derive(Debug, Clone)]
pub enum FetchMode {
    /// Write `clip.<ext>` holding the request URL and report progress
    Succeed { ext: &'static str },
    /// Fail with the given message after reporting some progress
    Fail(&'static str),
    /// Report progress then wait until cancelled
    Hang,
}

pub struct FakeFetcher {
    pub mode: FetchMode,
}

impl FakeFetcher {
    pub fn new(mode: FetchMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn list_formats(&self, url: &str) -> Result<MediaInfo, EngineError> {
        if url.contains("unavailable") {
            return Err(EngineError::Fetch("ERROR: Video unavailable".into()));
        }
        Ok(MediaInfo {
            title: "Test clip".to_string(),
            thumbnail: Some("https://example.com/thumb.jpg".to_string()),
            formats: vec![FormatOption {
                format_id: "18".to_string(),
                quality_label: "360p".to_string(),
                resolution: "640x360".to_string(),
                file_extension: "mp4".to_string(),
                file_size_bytes: Some(1_572_864),
            }],
        })
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        hook: &mut ProgressHook,
        logger: &dyn FetchLogger,
        cancel: &CancellationToken,
    ) -> Result<FetchOutput, EngineError> {
        logger.info(&format!("[generic] Extracting URL: {}", request.url));
        hook.on_progress(&RawProgress::downloading(" 10.0%", "1.00MiB/s", "00:09"));

        match &self.mode {
            FetchMode::Succeed { ext } => {
                let path = request.output_dir.join(format!("clip.{ext}"));
                tokio::fs::write(&path, request.url.as_bytes()).await?;
                hook.on_progress(&RawProgress::downloading("100%", "1.00MiB/s", "00:00"));
                hook.on_progress(&RawProgress::finished(Some(path.display().to_string())));
                Ok(FetchOutput {
                    path,
                    metadata: MediaMetadata {
                        title: Some("clip".to_string()),
                        ..Default::default()
                    },
                })
            }
            FetchMode::Fail(message) => {
                // Partial download left behind by the failing tool
                let partial = request.output_dir.join("clip.mp4.part");
                tokio::fs::write(&partial, b"partial").await?;
                logger.error(message);
                Err(EngineError::Fetch(message.to_string()))
            }
            FetchMode::Hang => {
                let partial = request.output_dir.join("clip.webm.part");
                tokio::fs::write(&partial, b"partial").await?;
                cancel.cancelled().await;
                Err(EngineError::Cancelled)
            }
        }
    }
}

/// Writes an mp3 next to its input, or fails when `fail` is set
pub struct FakeTranscoder {
    pub fail: bool,
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode_to_audio(
        &self,
        input: &Path,
        _cancel: &CancellationToken,
    ) -> Result<PathBuf, EngineError> {
        let output = self.audio_path_for(input);
        // Half-written output before failing, as a real encoder would leave
        tokio::fs::write(&output, b"mp3 bytes").await?;
        if self.fail {
            return Err(EngineError::Transcode(
                "Conversion failed: invalid data found when processing input".into(),
            ));
        }
        Ok(output)
    }
}

pub fn engines(mode: FetchMode, transcode_fails: bool) -> Engines {
    Engines::new(
        Arc::new(FakeFetcher::new(mode)),
        Arc::new(FakeTranscoder {
            fail: transcode_fails,
        }),
    )
}

pub struct Harness {
    pub launcher: JobLauncher,
    pub registry: Arc<JobRegistry>,
    pub metrics: Arc<Metrics>,
    pub storage: StorageClient,
    pub dir: TempDir,
}

pub fn harness(mode: FetchMode, transcode_fails: bool) -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let storage = StorageClient::local(dir.path()).expect("output dir");
    let registry = Arc::new(JobRegistry::new());
    let metrics = Arc::new(Metrics::new());

    let runner = JobRunner::builder()
        .engines(engines(mode, transcode_fails))
        .storage(storage.clone())
        .progress_interval(Duration::ZERO)
        .metrics(metrics.clone())
        .build();
    let launcher = JobLauncher::new(registry.clone(), Arc::new(runner), metrics.clone(), "best");

    Harness {
        launcher,
        registry,
        metrics,
        storage,
        dir,
    }
}

/// Names of published files, excluding the staging area
pub fn published_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .expect("read output dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != STAGING_DIR)
        .collect();
    names.sort();
    names
}

/// Number of entries left in the staging area
pub fn staging_entries(root: &Path) -> usize {
    std::fs::read_dir(root.join(STAGING_DIR))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Wait until `job` reaches a terminal status
pub async fn wait_finished(job: &JobEntry) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !job.is_finished() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not finish in time");
}
