use super::models::Config;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static BITRATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]*[kKmM]?$").expect("bitrate pattern is valid"));

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },

    #[error("{field} binary must not be empty")]
    EmptyBinary { field: &'static str },

    #[error("Invalid transcoder bitrate '{0}', expected e.g. '192k'")]
    InvalidBitrate(String),

    #[error("Transcoder sample_rate must be positive")]
    InvalidSampleRate,

    #[error("jobs.default_format_selector must not be empty")]
    EmptyFormatSelector,

    #[error("server.api.max_payload_bytes must be positive")]
    InvalidPayloadLimit,

    #[error("server.output_dir must not be empty")]
    EmptyOutputDir,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_jobs(config)?;
    validate_engines(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.api.max_payload_bytes.as_u64() == 0 {
        return Err(ValidationError::InvalidPayloadLimit);
    }
    if config.server.output_dir.as_os_str().is_empty() {
        return Err(ValidationError::EmptyOutputDir);
    }
    Ok(())
}

fn validate_jobs(config: &Config) -> Result<(), ValidationError> {
    let jobs = &config.jobs;
    let intervals = [
        ("jobs.stream_poll_interval_ms", jobs.stream_poll_interval_ms),
        ("jobs.eviction_ttl_secs", jobs.eviction_ttl_secs),
        ("jobs.sweep_interval_secs", jobs.sweep_interval_secs),
    ];
    for (field, value) in intervals {
        if value == 0 {
            return Err(ValidationError::ZeroInterval { field });
        }
    }

    if jobs.default_format_selector.trim().is_empty() {
        return Err(ValidationError::EmptyFormatSelector);
    }
    Ok(())
}

fn validate_engines(config: &Config) -> Result<(), ValidationError> {
    if config.fetcher.binary.trim().is_empty() {
        return Err(ValidationError::EmptyBinary { field: "fetcher" });
    }
    if config.transcoder.binary.trim().is_empty() {
        return Err(ValidationError::EmptyBinary { field: "transcoder" });
    }
    if config.transcoder.sample_rate == 0 {
        return Err(ValidationError::InvalidSampleRate);
    }
    if !BITRATE.is_match(&config.transcoder.bitrate) {
        return Err(ValidationError::InvalidBitrate(
            config.transcoder.bitrate.clone(),
        ));
    }
    Ok(())
}
