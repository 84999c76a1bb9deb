//! Live-stream ingestion control.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde_json::json;

use argus_core::stream::worker::StreamOptions;
use argus_model::{DetectionLevel, StreamKind};

use crate::api_types::{StreamResultsQuery, StreamStartBody, envelope};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// `POST /api/v1/streams`
pub async fn start_stream(
    State(state): State<AppState>,
    Json(body): Json<StreamStartBody>,
) -> AppResult<Json<serde_json::Value>> {
    let kind = match body.stream_type.as_deref() {
        None => StreamKind::Rtsp,
        Some(s) => {
            StreamKind::from_str(s).map_err(|e| AppError::invalid_input(e.to_string()))?
        }
    };
    let level = match body.level.as_deref() {
        None => DetectionLevel::Standard,
        Some(s) => DetectionLevel::from_str(s)
            .map_err(|e| AppError::invalid_input(e.to_string()))?,
    };
    let options = StreamOptions {
        kind,
        sample_interval: body.sample_interval.unwrap_or(1.0),
        detection_interval: body.detection_interval.unwrap_or(5.0),
        level,
        ..StreamOptions::default()
    };

    let stream_id =
        state
            .streams
            .start_stream(&body.stream_url, body.stream_id, options, None)?;
    Ok(Json(envelope(json!({ "stream_id": stream_id }))))
}

/// `GET /api/v1/streams`
pub async fn list_streams(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(envelope(state.streams.list()))
}

/// `GET /api/v1/streams/{id}/status`
pub async fn stream_status(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let status = state
        .streams
        .status(&stream_id)
        .ok_or_else(|| AppError::not_found(format!("stream {stream_id}")))?;
    Ok(Json(envelope(status)))
}

/// `GET /api/v1/streams/{id}/results`
pub async fn stream_results(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    Query(query): Query<StreamResultsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let limit = query.limit.unwrap_or(100);
    let results = state
        .streams
        .results(&stream_id, limit, query.since.as_deref())
        .ok_or_else(|| AppError::not_found(format!("stream {stream_id}")))?;
    Ok(Json(envelope(json!({
        "stream_id": stream_id,
        "total": results.len(),
        "results": results,
    }))))
}

/// `DELETE /api/v1/streams/{id}`
pub async fn stop_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    if !state.streams.stop_stream(&stream_id) {
        return Err(AppError::not_found(format!("stream {stream_id}")));
    }
    Ok(Json(envelope(json!({ "stopped": stream_id }))))
}
