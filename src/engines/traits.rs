use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::logger::FetchLogger;
use super::types::{AUDIO_EXTENSION, FetchOutput, FetchRequest, MediaInfo};
use crate::progress::ProgressHook;

/// Failures reported by the external fetch / transcode capabilities
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start {binary}: {message}")]
    Spawn { binary: String, message: String },
    #[error("{0}")]
    Fetch(String),
    #[error("{0}")]
    Transcode(String),
    #[error("unexpected engine output: {0}")]
    Parse(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Retrieves media for a URL
///
/// Implementations report progress through the [`ProgressHook`] and relay
/// their own diagnostics through the [`FetchLogger`]. They must stop work
/// promptly once `cancel` fires and return [`EngineError::Cancelled`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// List the formats available for `url` without downloading
    async fn list_formats(&self, url: &str) -> Result<MediaInfo, EngineError>;

    /// Download `request.url` into `request.output_dir`
    async fn fetch(
        &self,
        request: &FetchRequest,
        hook: &mut ProgressHook,
        logger: &dyn FetchLogger,
        cancel: &CancellationToken,
    ) -> Result<FetchOutput, EngineError>;
}

/// Converts a video file into an audio-only mp3
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Path the audio file for `input` will be written to
    fn audio_path_for(&self, input: &Path) -> PathBuf {
        input.with_extension(AUDIO_EXTENSION)
    }

    /// Extract the audio track of `input`, returning the written path
    async fn transcode_to_audio(
        &self,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, EngineError>;
}
