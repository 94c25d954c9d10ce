use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Finished files are published here and served by `/files/{filename}`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub api: ApiLimits,
}

/// API request limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            output_dir: default_output_dir(),
            api: ApiLimits::default(),
        }
    }
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(64 * 1024)
}

/// Job lifecycle tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Minimum gap between live-forwarded progress updates
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Upper bound on how long a stream waits before re-checking the bus
    #[serde(default = "default_stream_poll_interval_ms")]
    pub stream_poll_interval_ms: u64,
    /// Idle time after which a finished job is dropped from the registry
    #[serde(default = "default_eviction_ttl_secs")]
    pub eviction_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Fetcher selector used when a request carries no `format_id`
    #[serde(default = "default_format_selector")]
    pub default_format_selector: String,
}

impl JobsConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn stream_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stream_poll_interval_ms)
    }

    pub fn eviction_ttl(&self) -> Duration {
        Duration::from_secs(self.eviction_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: default_progress_interval_ms(),
            stream_poll_interval_ms: default_stream_poll_interval_ms(),
            eviction_ttl_secs: default_eviction_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            default_format_selector: default_format_selector(),
        }
    }
}

fn default_progress_interval_ms() -> u64 {
    1000
}

fn default_stream_poll_interval_ms() -> u64 {
    500
}

fn default_eviction_ttl_secs() -> u64 {
    30 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_format_selector() -> String {
    "best".to_string()
}

/// `yt-dlp` invocation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    #[serde(default = "default_fetcher_binary")]
    pub binary: String,
    /// Keep output names to ASCII without spaces
    #[serde(default = "default_true")]
    pub restrict_filenames: bool,
    /// Passed through verbatim before the URL
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            binary: default_fetcher_binary(),
            restrict_filenames: true,
            extra_args: Vec::new(),
        }
    }
}

fn default_fetcher_binary() -> String {
    "yt-dlp".to_string()
}

fn default_true() -> bool {
    true
}

/// `ffmpeg` audio extraction settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_transcoder_binary")]
    pub binary: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: default_transcoder_binary(),
            sample_rate: default_sample_rate(),
            bitrate: default_bitrate(),
        }
    }
}

fn default_transcoder_binary() -> String {
    "ffmpeg".to_string()
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_bitrate() -> String {
    "192k".to_string()
}

/// Log output settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Directory for the daily-rolling log file; console only when unset
    #[serde(default = "default_log_directory")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            file_prefix: default_log_file_prefix(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_directory() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}

fn default_log_file_prefix() -> String {
    "mediabox.log".to_string()
}

fn default_log_filter() -> String {
    "mediabox=info,tower_http=info".to_string()
}
