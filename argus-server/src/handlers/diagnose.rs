//! Still-frame diagnosis over uploaded, inlined, or fetched images.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Multipart, Query, State};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use argus_core::imageio::decode_frame;
use argus_core::pipeline::frame::FramePipeline;
use argus_model::{DetectionLevel, Frame};

use crate::api_types::{DiagnoseBody, DiagnoseQuery, envelope};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

fn parse_level(level: Option<&str>) -> AppResult<DetectionLevel> {
    match level {
        None => Ok(DetectionLevel::Standard),
        Some(s) => DetectionLevel::from_str(s)
            .map_err(|e| AppError::invalid_input(e.to_string())),
    }
}

fn validate_detectors(state: &AppState, names: &[String]) -> AppResult<()> {
    let unknown: Vec<&str> = names
        .iter()
        .filter(|name| !state.registry.is_registered(name))
        .map(|name| name.as_str())
        .collect();
    if !unknown.is_empty() && unknown.len() == names.len() {
        return Err(AppError::invalid_input(format!(
            "no known detectors in {unknown:?}"
        )));
    }
    Ok(())
}

async fn run_diagnosis(
    pipeline: Arc<FramePipeline>,
    frame: Frame,
    level: DetectionLevel,
    detectors: Option<Vec<String>>,
    image_id: String,
) -> AppResult<serde_json::Value> {
    let diagnosis = tokio::task::spawn_blocking(move || {
        pipeline.diagnose_with(&frame, level, detectors.as_deref(), &image_id, "")
    })
    .await
    .map_err(|e| AppError::internal(format!("diagnosis task failed: {e}")))?;
    Ok(envelope(diagnosis))
}

/// `POST /api/v1/diagnose` with a multipart `file` field.
pub async fn diagnose_upload(
    State(state): State<AppState>,
    Query(query): Query<DiagnoseQuery>,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let mut frame: Option<Frame> = None;
    let mut image_id = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid_input(format!("bad multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            image_id = field
                .file_name()
                .map(|name| name.to_string())
                .unwrap_or_default();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::invalid_input(format!("upload read failed: {e}")))?;
            frame = Some(
                decode_frame(&bytes)
                    .map_err(|e| AppError::invalid_image(e.to_string()))?,
            );
        }
    }
    let frame =
        frame.ok_or_else(|| AppError::invalid_input("multipart field 'file' is required"))?;

    let level = parse_level(query.level.as_deref())?;
    let detectors: Option<Vec<String>> = query.detectors.as_deref().map(|list| {
        list.split(',')
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    });
    if let Some(names) = &detectors {
        validate_detectors(&state, names)?;
    }

    debug!(image = %image_id, ?level, "multipart diagnosis");
    let pipeline = state.pipeline_for(query.profile.as_deref())?;
    Ok(Json(
        run_diagnosis(pipeline, frame, level, detectors, image_id).await?,
    ))
}

/// `POST /api/v1/diagnose/json` with base64 bytes or an image URL.
pub async fn diagnose_json(
    State(state): State<AppState>,
    Json(body): Json<DiagnoseBody>,
) -> AppResult<Json<serde_json::Value>> {
    let frame = match (&body.image_base64, &body.image_url) {
        (Some(encoded), _) => {
            let bytes = BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| AppError::invalid_image(format!("invalid base64: {e}")))?;
            decode_frame(&bytes).map_err(|e| AppError::invalid_image(e.to_string()))?
        }
        (None, Some(url)) => {
            let response = state
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| AppError::invalid_input(format!("fetch failed: {e}")))?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| AppError::invalid_input(format!("fetch read failed: {e}")))?;
            decode_frame(&bytes).map_err(|e| AppError::invalid_image(e.to_string()))?
        }
        (None, None) => {
            return Err(AppError::invalid_input(
                "either image_base64 or image_url is required",
            ));
        }
    };

    let level = parse_level(body.level.as_deref())?;
    if let Some(names) = &body.detectors {
        validate_detectors(&state, names)?;
    }
    let pipeline = state.pipeline_for(body.profile.as_deref())?;
    let image_id = body.image_id.clone().unwrap_or_default();
    Ok(Json(
        run_diagnosis(pipeline, frame, level, body.detectors, image_id).await?,
    ))
}
