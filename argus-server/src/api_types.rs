//! Request and response payloads of the HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::json;

use argus_core::DetectorMetadata;

/// Standard reply envelope: `code` 0 on success, a specific error code
/// otherwise.
pub fn envelope<T: Serialize>(data: T) -> serde_json::Value {
    json!({
        "code": 0,
        "message": "success",
        "data": data,
    })
}

#[derive(Debug, Deserialize)]
pub struct DiagnoseBody {
    /// Base64-encoded image bytes.
    pub image_base64: Option<String>,
    /// Or a URL to fetch the image from.
    pub image_url: Option<String>,
    pub image_id: Option<String>,
    pub profile: Option<String>,
    pub level: Option<String>,
    pub detectors: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiagnoseQuery {
    pub profile: Option<String>,
    pub level: Option<String>,
    pub detectors: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideoDiagnoseBody {
    pub video_path: String,
    pub strategy: Option<String>,
    pub sample_interval: Option<f64>,
    pub max_frames: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct StreamStartBody {
    pub stream_url: String,
    pub stream_id: Option<String>,
    pub stream_type: Option<String>,
    pub sample_interval: Option<f64>,
    pub detection_interval: Option<f64>,
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamResultsQuery {
    pub limit: Option<usize>,
    pub since: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskCreateBody {
    pub name: String,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub cron_expression: Option<String>,
    pub enabled: Option<bool>,
    pub config: Option<argus_model::TaskSpec>,
    pub output: Option<argus_model::OutputSpec>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecutionsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BaselineUpdateBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Serializable view of a detector's metadata.
#[derive(Debug, Serialize)]
pub struct DetectorInfo {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub priority: u32,
    pub supported_levels: Vec<String>,
    pub suppresses: Vec<&'static str>,
}

impl From<&'static DetectorMetadata> for DetectorInfo {
    fn from(metadata: &'static DetectorMetadata) -> Self {
        DetectorInfo {
            name: metadata.name,
            display_name: metadata.display_name,
            description: metadata.description,
            version: metadata.version,
            priority: metadata.priority,
            supported_levels: metadata
                .supported_levels
                .iter()
                .map(|level| level.to_string())
                .collect(),
            suppresses: metadata.suppresses.to_vec(),
        }
    }
}
