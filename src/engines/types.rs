use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::humanize::ByteSize;

/// Extension of every audio-only result
pub const AUDIO_EXTENSION: &str = "mp3";

/// What a fetcher is asked to retrieve
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// Fetcher format selector (`best`, or an id from a format listing)
    pub format_selector: String,
    /// Directory the fetcher must write into; owned by the job
    pub output_dir: PathBuf,
}

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchOutput {
    pub path: PathBuf,
    pub metadata: MediaMetadata,
}

impl FetchOutput {
    /// Lower-cased extension of the fetched file, if it has one
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub extractor: Option<String>,
    pub duration_secs: Option<f64>,
}

/// Format listing for a URL, produced without downloading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub thumbnail: Option<String>,
    pub formats: Vec<FormatOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatOption {
    pub format_id: String,
    pub quality_label: String,
    pub resolution: String,
    pub file_extension: String,
    pub file_size_bytes: Option<u64>,
}

impl FormatOption {
    /// Human readable size such as `12.3MB`, when the size is known
    pub fn size_label(&self) -> Option<String> {
        self.file_size_bytes
            .map(|bytes| ByteSize(bytes).to_human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_output_extension() {
        let output = FetchOutput {
            path: PathBuf::from("/tmp/x/Some Title.WEBM"),
            metadata: MediaMetadata::default(),
        };
        assert_eq!(output.extension().as_deref(), Some("webm"));

        let bare = FetchOutput {
            path: PathBuf::from("/tmp/x/noext"),
            metadata: MediaMetadata::default(),
        };
        assert!(bare.extension().is_none());
    }

    #[test]
    fn test_size_label() {
        let mut option = FormatOption {
            format_id: "18".to_string(),
            quality_label: "360p".to_string(),
            resolution: "640x360".to_string(),
            file_extension: "mp4".to_string(),
            file_size_bytes: Some(5 * 1024 * 1024),
        };
        assert_eq!(option.size_label().as_deref(), Some("5MB"));

        option.file_size_bytes = None;
        assert!(option.size_label().is_none());
    }
}
