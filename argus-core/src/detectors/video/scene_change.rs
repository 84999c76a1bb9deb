//! Scene-change detection: histogram distance between adjacent frames,
//! optionally corroborated by edge-map differences.

use std::time::Instant;

use argus_model::{
    Evidence, EvidenceValue, Frame, VideoDetectionResult, VideoSegment, VideoSeverity, issues,
};

use crate::detectors::VideoDetector;
use crate::imageops::Gray;
use crate::imageops::gradients::{EDGE_THRESHOLD, edge_map};
use crate::imageops::stats::{hist_bhattacharyya, histogram256};

use super::{ratio_severity, resolve_timestamps};

#[derive(Debug, Clone)]
pub struct SceneChangeOptions {
    /// Bhattacharyya distance above which adjacent frames differ.
    pub histogram_threshold: f64,
    /// Edge-map mismatch ratio above which adjacent frames differ.
    pub edge_threshold: f64,
    /// Changes per minute beyond which the stream is abnormal.
    pub max_changes_per_minute: f64,
    pub use_edge_detection: bool,
    /// When true both signals must agree; otherwise either suffices.
    pub require_both: bool,
}

impl Default for SceneChangeOptions {
    fn default() -> Self {
        SceneChangeOptions {
            histogram_threshold: 0.4,
            edge_threshold: 0.3,
            max_changes_per_minute: 5.0,
            use_edge_detection: true,
            require_both: false,
        }
    }
}

#[derive(Default)]
pub struct SceneChangeDetector {
    options: SceneChangeOptions,
}

struct ChangePoint {
    frame_index: usize,
    timestamp: f64,
    histogram_diff: f64,
    edge_diff: f64,
}

impl SceneChangeDetector {
    pub fn new(options: SceneChangeOptions) -> Self {
        SceneChangeDetector { options }
    }

    fn edge_difference(a: &[bool], b: &[bool]) -> f64 {
        if a.is_empty() {
            return 0.0;
        }
        let mismatched = a.iter().zip(b.iter()).filter(|(x, y)| x != y).count();
        mismatched as f64 / a.len() as f64
    }
}

impl VideoDetector for SceneChangeDetector {
    fn name(&self) -> &'static str {
        "scene_change"
    }

    fn detect(&self, frames: &[Frame], fps: f64, timestamps: &[f64]) -> VideoDetectionResult {
        let start = Instant::now();
        let opts = &self.options;
        let timestamps = resolve_timestamps(frames.len(), fps, timestamps);

        let video_duration = match (timestamps.first(), timestamps.last()) {
            (Some(first), Some(last)) if last > first => last - first,
            _ => frames.len() as f64 / fps.max(1.0),
        };

        let mut changes: Vec<ChangePoint> = Vec::new();
        let mut hist_diffs: Vec<f64> = Vec::new();

        if frames.len() >= 2 {
            let grays: Vec<Gray> = frames.iter().map(Gray::from_frame).collect();
            let hists: Vec<[u64; 256]> =
                grays.iter().map(|g| histogram256(g.data())).collect();
            let edges: Vec<Vec<bool>> = if opts.use_edge_detection {
                grays.iter().map(|g| edge_map(g, EDGE_THRESHOLD)).collect()
            } else {
                Vec::new()
            };

            for i in 1..grays.len() {
                let hist_diff = hist_bhattacharyya(&hists[i - 1], &hists[i]);
                hist_diffs.push(hist_diff);
                let edge_diff = if opts.use_edge_detection {
                    Self::edge_difference(&edges[i - 1], &edges[i])
                } else {
                    0.0
                };

                let is_change = if opts.require_both {
                    hist_diff > opts.histogram_threshold && edge_diff > opts.edge_threshold
                } else {
                    hist_diff > opts.histogram_threshold
                        || (opts.use_edge_detection && edge_diff > opts.edge_threshold)
                };
                if is_change {
                    changes.push(ChangePoint {
                        frame_index: i,
                        timestamp: timestamps[i],
                        histogram_diff: hist_diff,
                        edge_diff,
                    });
                }
            }
        }

        // Change points are instants: zero-duration segments.
        let segments: Vec<VideoSegment> = changes
            .iter()
            .map(|change| {
                let mut segment = VideoSegment::new(
                    change.frame_index,
                    change.frame_index,
                    change.timestamp,
                    change.timestamp,
                    (change.histogram_diff / opts.histogram_threshold).min(1.0),
                );
                segment
                    .metadata
                    .insert("histogram_diff".into(), change.histogram_diff.into());
                segment
                    .metadata
                    .insert("edge_diff".into(), change.edge_diff.into());
                segment
            })
            .collect();

        let changes_per_minute = if video_duration > 0.0 {
            changes.len() as f64 / video_duration * 60.0
        } else {
            0.0
        };
        let is_abnormal = changes_per_minute > opts.max_changes_per_minute;

        let avg_diff = if hist_diffs.is_empty() {
            0.0
        } else {
            hist_diffs.iter().sum::<f64>() / hist_diffs.len() as f64
        };
        let max_diff = hist_diffs.iter().cloned().fold(0.0, f64::max);

        let mut evidence = Evidence::new();
        evidence.insert("scene_change_count".into(), changes.len().into());
        evidence.insert("changes_per_minute".into(), changes_per_minute.into());
        evidence.insert("avg_histogram_diff".into(), avg_diff.into());
        evidence.insert("max_histogram_diff".into(), max_diff.into());
        evidence.insert("video_duration".into(), video_duration.into());
        evidence.insert(
            "change_timestamps".into(),
            EvidenceValue::Numbers(
                changes.iter().take(20).map(|c| c.timestamp).collect(),
            ),
        );

        let explanation = if is_abnormal {
            format!(
                "Scene changes are too frequent: {changes_per_minute:.1} per minute \
                 across {} change points",
                changes.len()
            )
        } else if changes.is_empty() {
            "No notable scene changes".to_string()
        } else {
            format!(
                "{} scene change(s) at a normal rate ({changes_per_minute:.1} per minute)",
                changes.len()
            )
        };

        VideoDetectionResult {
            detector_name: self.name().to_string(),
            issue_type: if is_abnormal {
                issues::SCENE_CHANGE.to_string()
            } else {
                "normal".to_string()
            },
            is_abnormal,
            score: changes_per_minute,
            threshold: opts.max_changes_per_minute,
            confidence: 0.9,
            severity: if is_abnormal {
                ratio_severity(changes_per_minute, opts.max_changes_per_minute)
            } else {
                VideoSeverity::Normal
            },
            segments,
            explanation,
            suggestions: if is_abnormal {
                vec![
                    "Check the stability of the video source".to_string(),
                    "Check whether the camera is being moved".to_string(),
                    "Check the signal path for interference".to_string(),
                ]
            } else {
                Vec::new()
            },
            possible_causes: if is_abnormal {
                vec![
                    "Camera is moved frequently".to_string(),
                    "Faulty video switcher".to_string(),
                    "Unstable video source".to_string(),
                    "Rapid lighting changes".to_string(),
                ]
            } else {
                Vec::new()
            },
            evidence,
            process_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            frames_analyzed: frames.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternating_colors_are_a_change_storm() {
        let detector = SceneChangeDetector::new(SceneChangeOptions::default());
        // 10 s at 30 fps; every 15th frame flips between red and blue.
        let frames: Vec<Frame> = (0..300)
            .map(|i| {
                if (i / 15) % 2 == 0 {
                    Frame::filled(32, 32, 0, 0, 255)
                } else {
                    Frame::filled(32, 32, 255, 0, 0)
                }
            })
            .collect();
        let result = detector.detect(&frames, 30.0, &[]);
        assert!(result.segments.len() > 5, "segments = {}", result.segments.len());
        assert!(result.is_abnormal);
        assert!(result.score > 5.0);
        for segment in &result.segments {
            assert_eq!(segment.duration, 0.0);
            assert!(segment.is_well_formed());
        }
    }

    #[test]
    fn static_scene_has_no_changes() {
        let detector = SceneChangeDetector::new(SceneChangeOptions::default());
        let frames: Vec<Frame> = (0..120).map(|_| Frame::filled(32, 32, 90, 90, 90)).collect();
        let result = detector.detect(&frames, 30.0, &[]);
        assert!(!result.is_abnormal);
        assert!(result.segments.is_empty());
    }

    #[test]
    fn occasional_changes_stay_normal() {
        let detector = SceneChangeDetector::new(SceneChangeOptions::default());
        // One change over 60 seconds of footage.
        let mut frames: Vec<Frame> = (0..900).map(|_| Frame::filled(16, 16, 20, 20, 20)).collect();
        frames.extend((0..900).map(|_| Frame::filled(16, 16, 220, 220, 220)));
        let result = detector.detect(&frames, 30.0, &[]);
        assert_eq!(result.segments.len(), 1);
        assert!(!result.is_abnormal);
    }
}
