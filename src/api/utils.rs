//! API utility functions
//!
//! Pure, stateless helpers for request parsing and response headers.

use axum::http::HeaderMap;

use super::models::DownloadRequest;
use crate::api::error::ApiError;

/// Encodings accepted by `POST /download`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
}

/// Parses the Content-Type header of a submission
///
/// Accepts `application/json` and `application/x-www-form-urlencoded`,
/// with or without parameters. A missing header is treated as a form post,
/// which is what plain HTML forms send.
pub fn parse_content_type(content_type: Option<&str>) -> Result<BodyKind, ApiError> {
    let Some(content_type) = content_type else {
        return Ok(BodyKind::Form);
    };

    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::UnsupportedMediaType(format!("invalid Content-Type: {content_type}"))
    })?;

    if media_type.type_() == mime::APPLICATION {
        if media_type.subtype() == mime::JSON {
            return Ok(BodyKind::Json);
        }
        if media_type.subtype() == mime::WWW_FORM_URLENCODED {
            return Ok(BodyKind::Form);
        }
    }

    Err(ApiError::UnsupportedMediaType(format!(
        "{}/{}",
        media_type.type_(),
        media_type.subtype()
    )))
}

/// Validates that body size does not exceed the maximum allowed size
pub fn validate_body_size(data: &[u8], max_size: usize) -> Result<(), ApiError> {
    if data.len() > max_size {
        return Err(ApiError::PayloadTooLarge(data.len()));
    }
    Ok(())
}

/// Decode a submission body of the given kind
pub fn parse_download_request(kind: BodyKind, body: &[u8]) -> Result<DownloadRequest, ApiError> {
    match kind {
        BodyKind::Json => Ok(serde_json::from_slice(body)?),
        BodyKind::Form => {
            let mut request = DownloadRequest::default();
            for (name, value) in url::form_urlencoded::parse(body) {
                let value = Some(value.into_owned());
                match name.as_ref() {
                    "url" => request.url = value,
                    "format" => request.format = value,
                    "format_id" => request.format_id = value,
                    _ => {}
                }
            }
            Ok(request)
        }
    }
}

/// Sequence number of the last event a reconnecting stream client saw
pub fn last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// `Content-Disposition` value that makes browsers save `filename`
///
/// Carries an ASCII fallback plus the exact name in RFC 5987 form.
pub fn attachment_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len() * 3);
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_content_type() {
        assert_eq!(parse_content_type(Some("application/json")).unwrap(), BodyKind::Json);
        assert_eq!(
            parse_content_type(Some("application/json; charset=utf-8")).unwrap(),
            BodyKind::Json
        );
        assert_eq!(
            parse_content_type(Some("application/x-www-form-urlencoded")).unwrap(),
            BodyKind::Form
        );
        assert_eq!(parse_content_type(None).unwrap(), BodyKind::Form);
    }

    #[test]
    fn test_parse_content_type_invalid() {
        for bad in ["text/plain", "multipart/form-data; boundary=x", "application/jsonp", "invalid"] {
            assert!(
                matches!(parse_content_type(Some(bad)), Err(ApiError::UnsupportedMediaType(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_body_size() {
        let data = vec![0u8; 1000];
        assert!(validate_body_size(&data, 1000).is_ok());
        assert!(matches!(
            validate_body_size(&data, 999),
            Err(ApiError::PayloadTooLarge(1000))
        ));
    }

    #[test]
    fn test_parse_form_body() {
        let body = b"url=https%3A%2F%2Fexample.com%2Fv%3Fa%3D1&format=audio&ignored=1";
        let request = parse_download_request(BodyKind::Form, body).unwrap();
        assert_eq!(request.url.as_deref(), Some("https://example.com/v?a=1"));
        assert_eq!(request.format.as_deref(), Some("audio"));
        assert!(request.format_id.is_none());
    }

    #[test]
    fn test_parse_json_body() {
        let body = br#"{"url": "https://example.com/v", "format_id": "18"}"#;
        let request = parse_download_request(BodyKind::Json, body).unwrap();
        assert_eq!(request.format_id.as_deref(), Some("18"));
        assert!(request.format.is_none());

        assert!(matches!(
            parse_download_request(BodyKind::Json, b"{not json"),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_last_event_id() {
        let mut headers = HeaderMap::new();
        assert_eq!(last_event_id(&headers), None);
        headers.insert("last-event-id", HeaderValue::from_static(" 7 "));
        assert_eq!(last_event_id(&headers), Some(7));
        headers.insert("last-event-id", HeaderValue::from_static("abc"));
        assert_eq!(last_event_id(&headers), None);
    }

    #[test]
    fn test_attachment_disposition() {
        assert_eq!(
            attachment_disposition("clip.mp3"),
            "attachment; filename=\"clip.mp3\"; filename*=UTF-8''clip.mp3"
        );
        assert_eq!(
            attachment_disposition("Café \"live\".mp3"),
            "attachment; filename=\"Caf_ _live_.mp3\"; filename*=UTF-8''Caf%C3%A9%20%22live%22.mp3"
        );
    }
}
