use thiserror::Error;

use super::models::DownloadRequest;

const MAX_URL_LEN: usize = 2048;
const MAX_FORMAT_ID_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum RequestValidationError {
    #[error("url is required")]
    MissingUrl,
    #[error("url exceeds {MAX_URL_LEN} characters")]
    UrlTooLong,
    #[error("url must not contain whitespace or control characters")]
    InvalidUrlCharacters,
    #[error("format_id exceeds {MAX_FORMAT_ID_LEN} characters")]
    FormatIdTooLong,
    #[error("format_id '{0}' contains unsupported characters")]
    InvalidFormatId(String),
}

/// Shape checks on a submission; URL scheme and format values are
/// validated when the job key is derived
pub fn validate_download_request(request: &DownloadRequest) -> Result<(), RequestValidationError> {
    let url = request
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(RequestValidationError::MissingUrl)?;

    if url.len() > MAX_URL_LEN {
        return Err(RequestValidationError::UrlTooLong);
    }

    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(RequestValidationError::InvalidUrlCharacters);
    }

    if let Some(format_id) = request.format_id.as_deref().map(str::trim) {
        if format_id.len() > MAX_FORMAT_ID_LEN {
            return Err(RequestValidationError::FormatIdTooLong);
        }
        // Selector grammar: ids, `/` fallbacks, `+` merges and `[...]` filters
        let allowed = |c: char| c.is_ascii_alphanumeric() || "-_+/.,:*<>=![]".contains(c);
        if format_id.starts_with('-') || !format_id.chars().all(allowed) {
            return Err(RequestValidationError::InvalidFormatId(
                format_id.to_string(),
            ));
        }
    }

    Ok(())
}
