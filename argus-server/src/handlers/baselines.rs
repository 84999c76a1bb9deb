//! Baseline image management and comparison.

use axum::Json;
use axum::extract::{Multipart, Path, State};
use serde_json::json;

use argus_core::detectors::Detector;
use argus_core::detectors::baseline::{BaselineComparisonDetector, BaselineOptions};
use argus_core::imageio::decode_frame;
use argus_model::{DetectionLevel, Frame};

use crate::api_types::{BaselineUpdateBody, envelope};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

struct UploadedBaseline {
    frame: Frame,
    name: String,
    description: Option<String>,
    tags: Option<Vec<String>>,
}

async fn read_upload(mut multipart: Multipart) -> AppResult<UploadedBaseline> {
    let mut frame: Option<Frame> = None;
    let mut name: Option<String> = None;
    let mut description: Option<String> = None;
    let mut tags: Option<Vec<String>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid_input(format!("bad multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().map(|n| n.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::invalid_input(format!("upload read failed: {e}")))?;
                frame = Some(
                    decode_frame(&bytes)
                        .map_err(|e| AppError::invalid_image(e.to_string()))?,
                );
                if name.is_none() {
                    name = file_name;
                }
            }
            Some("name") => {
                name = Some(field.text().await.unwrap_or_default());
            }
            Some("description") => {
                description = Some(field.text().await.unwrap_or_default());
            }
            Some("tags") => {
                let raw = field.text().await.unwrap_or_default();
                tags = Some(
                    raw.split(',')
                        .map(|tag| tag.trim().to_string())
                        .filter(|tag| !tag.is_empty())
                        .collect(),
                );
            }
            _ => {}
        }
    }

    Ok(UploadedBaseline {
        frame: frame
            .ok_or_else(|| AppError::invalid_input("multipart field 'file' is required"))?,
        name: name.unwrap_or_else(|| "baseline".to_string()),
        description,
        tags,
    })
}

/// `POST /api/v1/baselines` (multipart: file, name?, description?, tags?)
pub async fn create_baseline(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let upload = read_upload(multipart).await?;
    let baseline_id = state.baselines.save(
        &upload.frame,
        &upload.name,
        upload.description.as_deref(),
        upload.tags,
    )?;
    Ok(Json(envelope(json!({ "baseline_id": baseline_id }))))
}

/// `GET /api/v1/baselines`
pub async fn list_baselines(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(envelope(state.baselines.list()))
}

/// `GET /api/v1/baselines/{id}`
pub async fn get_baseline(
    State(state): State<AppState>,
    Path(baseline_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let record = state
        .baselines
        .get(&baseline_id)
        .ok_or_else(|| AppError::not_found(format!("baseline {baseline_id}")))?;
    Ok(Json(envelope(record)))
}

/// `PUT /api/v1/baselines/{id}`
pub async fn update_baseline(
    State(state): State<AppState>,
    Path(baseline_id): Path<String>,
    Json(body): Json<BaselineUpdateBody>,
) -> AppResult<Json<serde_json::Value>> {
    let record = state.baselines.update(
        &baseline_id,
        body.name.as_deref(),
        body.description.as_deref(),
        body.tags,
    )?;
    Ok(Json(envelope(record)))
}

/// `DELETE /api/v1/baselines/{id}`
pub async fn delete_baseline(
    State(state): State<AppState>,
    Path(baseline_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.baselines.delete(&baseline_id)?;
    Ok(Json(envelope(json!({ "deleted": baseline_id }))))
}

/// `POST /api/v1/baselines/{id}/compare` — diagnose an uploaded frame
/// against the stored reference.
pub async fn compare_with_baseline(
    State(state): State<AppState>,
    Path(baseline_id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    let mut frame: Option<Frame> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid_input(format!("bad multipart body: {e}")))?
    {
        if field.name() == Some("file") {
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

    let reference = state.baselines.get_image(&baseline_id)?;
    let finding = tokio::task::spawn_blocking(move || {
        let detector =
            BaselineComparisonDetector::new(reference, BaselineOptions::default())?;
        Ok::<_, argus_core::EngineError>(detector.detect(&frame, DetectionLevel::Standard))
    })
    .await
    .map_err(|e| AppError::internal(format!("comparison task failed: {e}")))??;

    Ok(Json(envelope(finding)))
}
