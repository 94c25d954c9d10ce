use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::convert::Infallible;

use super::{
    models::{
        FormatsQuery, FormatsResponse, HealthResponse, JobAcceptedResponse, LogsResponse,
        ProgressResponse,
    },
    state::AppState,
    utils::{attachment_disposition, last_event_id, parse_content_type, parse_download_request},
};
use crate::api::error::ApiError;
use crate::progress::{DONE_SENTINEL, StreamEncoder, StreamItem, WireMessage};
use crate::registry::JobEntry;
use std::sync::Arc;

/// Job submission endpoint (POST /download)
///
/// Accepts an HTML form post or a JSON body with `url`, `format`
/// (`video` | `audio`) and an optional `format_id`.
///
/// ## Flow:
/// 1. Check Content-Type and read the body under the configured size limit
/// 2. Validate the request shape
/// 3. Derive the job key and register the job (joining an in-flight one
///    with the same key)
/// 4. Start the runner in the background and return 202 with the key
///
/// Invalid input is rejected with 400 before any job or progress bus exists.
pub async fn submit_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let kind = parse_content_type(content_type)?;

    let limit = state.config.server.api.max_payload_bytes.as_usize();
    let body = read_body(body, limit).await?;
    let request = parse_download_request(kind, &body)?;
    super::validation::validate_download_request(&request)
        .map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let submission = state.launcher.submit(
        request.url.as_deref().unwrap_or_default(),
        request.format.as_deref(),
        request.format_id.as_deref(),
    )?;

    let key = submission.job.key().to_string();
    let response = JobAcceptedResponse {
        events_url: format!("/download/{key}/events"),
        progress_url: format!("/download/{key}/progress"),
        status: submission.job.status(),
        created: submission.created,
        key,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Reads the request body, enforcing the payload limit
///
/// Decompression is handled by `RequestDecompressionLayer`, so the limit
/// applies to decoded bytes.
async fn read_body(body: Body, limit: usize) -> Result<Vec<u8>, ApiError> {
    let data = http_body_util::Limited::new(body, limit.saturating_add(1))
        .collect()
        .await
        .map_err(|err| {
            if err.is::<http_body_util::LengthLimitError>() {
                ApiError::PayloadTooLarge(limit.saturating_add(1))
            } else {
                ApiError::InvalidInput(format!("failed to read body: {err}"))
            }
        })?
        .to_bytes()
        .to_vec();

    super::utils::validate_body_size(&data, limit)?;
    Ok(data)
}

fn find_job(state: &AppState, key: &str) -> Result<Arc<JobEntry>, ApiError> {
    state
        .registry
        .get(key)
        .ok_or_else(|| ApiError::JobNotFound(key.to_string()))
}

/// Event stream endpoint (GET /download/{key}/events)
///
/// Server-sent events, one per progress event, with the event's sequence
/// number as SSE `id`. A reconnecting client's `Last-Event-ID` resumes
/// after that event; otherwise the whole log is replayed. The stream ends
/// with a single `[DONE]` message. Disconnecting does not affect the job.
pub async fn stream_events(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job = find_job(&state, &key)?;
    let resume = last_event_id(&headers);
    tracing::debug!(key = %key, ?resume, "Event stream opened");

    let stream = StreamEncoder::new(job.bus().clone(), state.stream_poll_interval())
        .resume_after(resume)
        .into_stream()
        .map(|item| Ok(to_sse_event(item)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(item: StreamItem) -> Event {
    match item {
        StreamItem::Event { seq, message } => Event::default()
            .id(seq.to_string())
            .data(message.to_json()),
        StreamItem::Done => Event::default().data(DONE_SENTINEL),
    }
}

/// Polling endpoint (GET /download/{key}/progress)
///
/// Latest event of the job in wire form; 404 with `"status": "not_found"`
/// for unknown keys.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = find_job(&state, &key)?;
    let response = ProgressResponse {
        status: job.status(),
        event: job.bus().latest().as_ref().map(WireMessage::from),
        key,
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Event log replay (GET /download/{key}/logs)
pub async fn get_logs(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = find_job(&state, &key)?;
    let response = LogsResponse {
        status: job.status(),
        events: job.bus().all().iter().map(WireMessage::from).collect(),
        key,
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Job snapshot (GET /download/{key})
pub async fn get_job(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = find_job(&state, &key)?;
    Ok((StatusCode::OK, Json(job.snapshot())))
}

/// Cooperative cancellation (POST /download/{key}/cancel)
///
/// 202 means the request was recorded, not that the job is gone. A running
/// job stops at its next checkpoint and ends with an `Error` event reading
/// "download cancelled"; one already past its last checkpoint still ends
/// `Completed`. The returned snapshot and the job's later events carry the
/// actual outcome. 409 if the job already finished.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.registry.cancel(&key)?;
    Ok((StatusCode::ACCEPTED, Json(job.snapshot())))
}

/// Format listing (GET /formats?url=...)
///
/// Queries the fetcher without downloading anything.
pub async fn list_formats(
    State(state): State<AppState>,
    Query(query): Query<FormatsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = query.url.unwrap_or_default();
    let url = crate::registry::canonical_url(&raw)?;

    let info = state
        .fetcher
        .list_formats(url.as_str())
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    Ok((StatusCode::OK, Json(FormatsResponse::from(info))))
}

/// File retrieval (GET /files/{filename})
///
/// Streams a published file as an attachment. 404 if absent, 400 for
/// names that try to leave the output directory.
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let file = state.storage.open(&filename).await?;

    let content_type = mime_for(&file.filename);
    let disposition = HeaderValue::from_str(&attachment_disposition(&file.filename))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut response = Body::from_stream(file.body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file.size));
    if let Ok(modified) = HeaderValue::from_str(&file.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, modified);
    }

    Ok(response)
}

fn mime_for(filename: &str) -> &'static str {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("opus") | Some("ogg") => "audio/ogg",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

/// Health check endpoint (GET /health)
///
/// Reports components, version, registry counts and job counters.
/// Returns 503 when the output directory is unreachable.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());

    let storage_status = match tokio::fs::metadata(state.storage.root()).await {
        Ok(meta) if meta.is_dir() => "healthy",
        _ => "unhealthy",
    };
    components.insert("storage".to_string(), storage_status.to_string());

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        jobs: state.registry.stats(),
        metrics: state.metrics.snapshot(),
    };

    (status_code, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("a.MP3"), "audio/mpeg");
        assert_eq!(mime_for("a.webm"), "video/webm");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }
}
