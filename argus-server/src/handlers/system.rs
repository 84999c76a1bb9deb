use axum::Json;
use axum::extract::State;
use serde_json::json;

use crate::api_types::{DetectorInfo, envelope};
use crate::errors::AppResult;
use crate::state::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(envelope(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

pub async fn list_detectors(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let detectors: Vec<DetectorInfo> = state
        .registry
        .list()
        .into_iter()
        .map(DetectorInfo::from)
        .collect();
    Ok(Json(envelope(detectors)))
}

pub async fn list_profiles() -> Json<serde_json::Value> {
    let profiles: Vec<_> = argus_config::preset_names()
        .iter()
        .filter_map(|name| argus_config::preset(name).ok())
        .collect();
    Json(envelope(profiles))
}
