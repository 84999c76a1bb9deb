use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::evidence::Evidence;

/// Severity ladder used by video-scoped detectors. The top rung is named
/// `error` on the wire, matching the report format consumed downstream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum VideoSeverity {
    #[default]
    Normal,
    Info,
    Warning,
    Error,
}

impl VideoSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoSeverity::Normal => "normal",
            VideoSeverity::Info => "info",
            VideoSeverity::Warning => "warning",
            VideoSeverity::Error => "error",
        }
    }

    /// Fixed deduction applied to the overall video score per abnormal
    /// result of this severity.
    pub fn score_penalty(&self) -> f64 {
        match self {
            VideoSeverity::Normal => 0.0,
            VideoSeverity::Info => 5.0,
            VideoSeverity::Warning => 15.0,
            VideoSeverity::Error => 30.0,
        }
    }
}

impl fmt::Display for VideoSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoSeverity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(VideoSeverity::Normal),
            "info" => Ok(VideoSeverity::Info),
            "warning" => Ok(VideoSeverity::Warning),
            "error" => Ok(VideoSeverity::Error),
            other => Err(ModelError::UnknownSeverity(other.to_string())),
        }
    }
}

/// Contiguous frame/time range flagged by one video detector.
///
/// Segments from a single detector never overlap; segments from different
/// detectors may overlap freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSegment {
    pub start_frame: usize,
    pub end_frame: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Evidence,
}

impl VideoSegment {
    pub fn new(
        start_frame: usize,
        end_frame: usize,
        start_time: f64,
        end_time: f64,
        confidence: f64,
    ) -> Self {
        VideoSegment {
            start_frame,
            end_frame,
            start_time,
            end_time,
            duration: end_time - start_time,
            confidence,
            metadata: Evidence::new(),
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.start_frame <= self.end_frame && self.start_time <= self.end_time
    }
}

/// One video detector's verdict over a sampled frame sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoDetectionResult {
    pub detector_name: String,
    pub issue_type: String,
    pub is_abnormal: bool,
    pub score: f64,
    pub threshold: f64,
    pub confidence: f64,
    pub severity: VideoSeverity,

    #[serde(default)]
    pub segments: Vec<VideoSegment>,

    pub explanation: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub possible_causes: Vec<String>,
    #[serde(default)]
    pub evidence: Evidence,

    pub process_time_ms: f64,
    pub frames_analyzed: usize,
}

/// One entry in the time-ordered issue list of a [`VideoDiagnosis`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoIssue {
    pub issue_type: String,
    pub severity: VideoSeverity,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub confidence: f64,
    pub description: String,
}

/// Container-level facts about an opened video.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
    pub duration: f64,
    pub codec: String,
}

/// Per-video aggregate across all video detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoDiagnosis {
    pub video_path: String,
    pub video_id: String,

    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
    pub frame_count: u64,
    pub sampled_frames: usize,

    pub is_abnormal: bool,
    /// 100 minus per-severity penalties, floored at 0.
    pub overall_score: f64,
    pub primary_issue: Option<String>,
    pub severity: VideoSeverity,

    pub issues: Vec<VideoIssue>,
    pub detection_results: Vec<VideoDetectionResult>,

    pub process_time_ms: f64,
}
