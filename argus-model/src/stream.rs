use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnosis::Diagnosis;
use crate::error::ModelError;
use crate::severity::Severity;
use crate::video::VideoDetectionResult;

/// Live source protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    #[default]
    Rtsp,
    Rtmp,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Rtsp => "rtsp",
            StreamKind::Rtmp => "rtmp",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rtsp" => Ok(StreamKind::Rtsp),
            "rtmp" => Ok(StreamKind::Rtmp),
            other => Err(ModelError::UnknownStreamKind(other.to_string())),
        }
    }
}

/// Whether the ingestor's worker tasks are alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Running,
    Stopped,
}

/// Point-in-time snapshot of an ingested stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStatus {
    pub stream_id: String,
    pub stream_url: String,
    pub kind: StreamKind,
    pub status: StreamState,
    pub is_connected: bool,
    pub fps: f64,
    pub frames_received: u64,
    pub frames_analyzed: u64,
    pub connection_errors: u64,
    pub reconnect_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub last_result_at: Option<DateTime<Utc>>,
}

/// One analysis tick over a live stream: the still-image diagnosis of the
/// newest buffered frame merged with the video detectors' view of the
/// recent window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamResult {
    pub stream_id: String,
    pub timestamp: DateTime<Utc>,
    pub is_connected: bool,
    pub fps: f64,
    pub is_abnormal: bool,
    pub image_detection: Diagnosis,
    pub video_detection: Vec<VideoDetectionResult>,
    pub primary_issue: Option<String>,
    pub severity: Severity,
}
