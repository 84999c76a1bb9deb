//! Video-file diagnosis.

use std::path::PathBuf;
use std::str::FromStr;

use axum::Json;
use axum::extract::State;

use argus_core::pipeline::sampler::{FrameSampler, SampleStrategy};
use argus_core::pipeline::video::VideoPipeline;

use crate::api_types::{VideoDiagnoseBody, envelope};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// `POST /api/v1/video/diagnose` over a server-visible file path.
pub async fn diagnose_video(
    State(_state): State<AppState>,
    Json(body): Json<VideoDiagnoseBody>,
) -> AppResult<Json<serde_json::Value>> {
    let strategy = match body.strategy.as_deref() {
        None => SampleStrategy::Interval,
        Some(name) => SampleStrategy::from_str(name)
            .map_err(|e| AppError::invalid_input(e.to_string()))?,
    };
    let sampler = FrameSampler {
        strategy,
        interval: body.sample_interval.unwrap_or(1.0),
        max_frames: body.max_frames.unwrap_or(300),
        ..FrameSampler::default()
    };
    let path = PathBuf::from(&body.video_path);

    let diagnosis = tokio::task::spawn_blocking(move || {
        let pipeline = VideoPipeline::new(VideoPipeline::default_detectors(), sampler);
        pipeline.diagnose_path(&path)
    })
    .await
    .map_err(|e| AppError::internal(format!("video task failed: {e}")))??;

    Ok(Json(envelope(diagnosis)))
}
