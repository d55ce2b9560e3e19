use crate::{
    error::{IngestError, Result},
    metrics,
    server::state::AppState,
    storage::sanitize_relative_path,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::info;

fn is_playlist(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".m3u8")
}

fn upload_kind(path: &str) -> &'static str {
    if is_playlist(path) { "playlist" } else { "segment" }
}

/// WebDAV PUT/POST of a playlist or segment.
///
/// The bytes are stored first; the tracking engine only sees the upload once
/// the write succeeded.
pub async fn upload(
    Path((channel_id, path)): Path<(String, String)>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response> {
    let start = Instant::now();
    let kind = upload_kind(&path);

    let result = store_and_track(&state, &channel_id, &path, body).await;

    let status = match &result {
        Ok(response) => response.status().as_u16(),
        Err(e) => e.status().as_u16(),
    };
    metrics::record_request(kind, status);
    metrics::record_duration(kind, start);

    result
}

async fn store_and_track(
    state: &AppState,
    channel_id: &str,
    path: &str,
    body: Bytes,
) -> Result<Response> {
    let channel = sanitize_relative_path(channel_id)
        .filter(|c| !c.contains('/'))
        .ok_or_else(|| IngestError::InvalidPath(channel_id.to_string()))?;
    let relative = sanitize_relative_path(path).ok_or_else(|| IngestError::InvalidPath(path.to_string()))?;

    if body.is_empty() {
        return Err(IngestError::MissingBody);
    }

    state
        .storage
        .write(&channel, &relative, &body)
        .await
        .map_err(|source| {
            metrics::record_storage_error();
            IngestError::StorageWrite {
                path: format!("{}/{}", channel, relative),
                source,
            }
        })?;

    let now = state.clock.now_ms();

    let response = if is_playlist(&relative) {
        info!("Playlist upload {}/{} ({} bytes)", channel, relative, body.len());
        let outcome = state.engine.ingest_playlist(&channel, &relative, &body, now);
        (StatusCode::CREATED, Json(outcome)).into_response()
    } else {
        info!("Segment upload {}/{} ({} bytes)", channel, relative, body.len());
        let outcome = state
            .engine
            .ingest_segment(&channel, &relative, body.len() as u64, now);
        (StatusCode::CREATED, Json(outcome)).into_response()
    };

    Ok(response)
}

/// Publishers delete segments that slid out of the window; accept and ignore
pub async fn delete(Path((channel_id, path)): Path<(String, String)>) -> StatusCode {
    info!("Ignoring DELETE of {}/{}", channel_id, path);
    metrics::record_request("delete", 204);
    StatusCode::NO_CONTENT
}

/// The ingest namespace is write-only
pub async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}
