//! External media capabilities: fetching and audio transcoding
//!
//! The runner only sees the [`Fetcher`] and [`Transcoder`] traits, so tests
//! substitute in-process fakes for the `yt-dlp` and `ffmpeg` backed
//! implementations.

pub mod ffmpeg;
pub mod logger;
pub mod traits;
pub mod types;
pub mod ytdlp;

pub use ffmpeg::FfmpegTranscoder;
pub use logger::{BusLogger, FetchLogger};
pub use traits::{EngineError, Fetcher, Transcoder};
pub use types::{AUDIO_EXTENSION, FetchOutput, FetchRequest, FormatOption, MediaInfo, MediaMetadata};
pub use ytdlp::YtDlpFetcher;

use std::sync::Arc;

use crate::config::Config;

/// The pair of capabilities a job runner depends on
#[derive(Clone)]
pub struct Engines {
    pub fetcher: Arc<dyn Fetcher>,
    pub transcoder: Arc<dyn Transcoder>,
}

impl Engines {
    pub fn new(fetcher: Arc<dyn Fetcher>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            fetcher,
            transcoder,
        }
    }

    /// Build the process-backed engines described by `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(YtDlpFetcher::new(&config.fetcher)),
            Arc::new(FfmpegTranscoder::new(&config.transcoder)),
        )
    }
}
