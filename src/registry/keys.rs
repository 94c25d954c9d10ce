//! Job identity: URL canonicalisation and deterministic keys

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

use super::error::{RegistryError, Result};

/// Requested result type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Video,
    /// Audio-only; the published file is always an mp3
    Audio,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Video => "video",
            OutputFormat::Audio => "audio",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(OutputFormat::Video),
            "audio" => Ok(OutputFormat::Audio),
            _ => Err(RegistryError::InvalidFormat(s.to_string())),
        }
    }
}

/// Validated, canonical description of a job; the key derives from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub key: String,
    pub url: Url,
    pub format: OutputFormat,
    pub selector: String,
}

impl JobSpec {
    pub fn new(raw_url: &str, format: OutputFormat, selector: &str) -> Result<Self> {
        let url = canonical_url(raw_url)?;
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(RegistryError::InvalidFormat("empty format selector".to_string()));
        }

        Ok(Self {
            key: job_key(&url, format, selector),
            url,
            format,
            selector: selector.to_string(),
        })
    }
}

/// Parse and normalise a source URL
///
/// Only `http` and `https` are accepted. The fragment and any trailing
/// slash on a non-root path are dropped; the parser already lower-cases
/// scheme and host and removes default ports.
pub fn canonical_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(RegistryError::InvalidUrl("URL is empty".to_string()));
    }

    let mut url =
        Url::parse(raw).map_err(|e| RegistryError::InvalidUrl(format!("{raw}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(RegistryError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(RegistryError::InvalidUrl(format!("{raw}: missing host")));
    }

    url.set_fragment(None);
    if url.path().len() > 1 && url.path().ends_with('/') {
        let trimmed = url.path().trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }

    Ok(url)
}

/// Deterministic opaque key: the same URL, format and selector always map
/// to the same key
pub fn job_key(url: &Url, format: OutputFormat, selector: &str) -> String {
    let name = format!("{url}|{format}|{selector}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("video".parse::<OutputFormat>().unwrap(), OutputFormat::Video);
        assert_eq!(" Audio ".parse::<OutputFormat>().unwrap(), OutputFormat::Audio);
        assert!(matches!(
            "mp4".parse::<OutputFormat>(),
            Err(RegistryError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_canonical_url_normalisation() {
        let url = canonical_url("  HTTPS://Example.COM:443/Watch/?v=1#t=30 ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/Watch?v=1");

        let root = canonical_url("http://example.com:80/").unwrap();
        assert_eq!(root.as_str(), "http://example.com/");

        let port = canonical_url("http://example.com:8080/a").unwrap();
        assert_eq!(port.as_str(), "http://example.com:8080/a");
    }

    #[test]
    fn test_canonical_url_rejects() {
        for raw in ["", "   ", "not a url", "ftp://example.com/file", "file:///etc/passwd"] {
            assert!(
                matches!(canonical_url(raw), Err(RegistryError::InvalidUrl(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = JobSpec::new("https://example.com/v/1/", OutputFormat::Audio, "best").unwrap();
        let b = JobSpec::new("https://EXAMPLE.com/v/1#x", OutputFormat::Audio, " best ").unwrap();
        assert_eq!(a.key, b.key);
        assert_eq!(a, b);

        let video = JobSpec::new("https://example.com/v/1", OutputFormat::Video, "best").unwrap();
        let other = JobSpec::new("https://example.com/v/1", OutputFormat::Audio, "140").unwrap();
        assert_ne!(a.key, video.key);
        assert_ne!(a.key, other.key);
        assert!(Uuid::parse_str(&a.key).is_ok());
    }

    #[test]
    fn test_empty_selector_rejected() {
        assert!(JobSpec::new("https://example.com/v", OutputFormat::Video, " ").is_err());
    }
}
