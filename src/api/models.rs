//! Request and response bodies of the HTTP API
//!
//! - `POST /download` accepts a [`DownloadRequest`] (form or JSON) and
//!   answers with [`JobAcceptedResponse`]
//! - `GET /download/{key}/progress` returns a [`ProgressResponse`] holding
//!   the latest event in its wire form
//! - `GET /download/{key}/logs` replays every event as a [`LogsResponse`]
//! - `GET /formats?url=` lists formats as a [`FormatsResponse`]
//!
//! Events are always rendered as [`WireMessage`], the same JSON the event
//! stream carries, e.g.
//!
//! ```json
//! {"type": "progress", "percent": 42.5, "speed": "1.20MiB/s", "eta": "00:12", "line": "..."}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::engines::{FormatOption, MediaInfo};
use crate::observability::MetricsSnapshot;
use crate::progress::WireMessage;
use crate::registry::{JobStatus, RegistryStats};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: Option<String>,
    /// `video` (default) or `audio`
    #[serde(default)]
    pub format: Option<String>,
    /// Format id from `/formats`; the configured selector when absent
    #[serde(default)]
    pub format_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobAcceptedResponse {
    pub key: String,
    pub status: JobStatus,
    /// False when the request joined an in-flight job with the same key
    pub created: bool,
    pub events_url: String,
    pub progress_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProgressResponse {
    pub key: String,
    pub status: JobStatus,
    /// Null until the first event is recorded
    pub event: Option<WireMessage>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogsResponse {
    pub key: String,
    pub status: JobStatus,
    pub events: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
pub struct FormatsQuery {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FormatsResponse {
    pub title: String,
    pub thumbnail: Option<String>,
    pub formats: Vec<FormatEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FormatEntry {
    pub format_id: String,
    pub quality: String,
    pub resolution: String,
    pub ext: String,
    pub filesize: Option<u64>,
    /// Human readable size, e.g. `12.3MB`
    pub filesize_label: Option<String>,
}

impl From<FormatOption> for FormatEntry {
    fn from(option: FormatOption) -> Self {
        Self {
            filesize_label: option.size_label(),
            format_id: option.format_id,
            quality: option.quality_label,
            resolution: option.resolution,
            ext: option.file_extension,
            filesize: option.file_size_bytes,
        }
    }
}

impl From<MediaInfo> for FormatsResponse {
    fn from(info: MediaInfo) -> Self {
        Self {
            title: info.title,
            thumbnail: info.thumbnail,
            formats: info.formats.into_iter().map(FormatEntry::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub jobs: RegistryStats,
    pub metrics: MetricsSnapshot,
}
