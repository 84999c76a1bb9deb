//! Freeze detection: runs of near-identical consecutive frames.

use std::time::Instant;

use argus_model::{
    Evidence, Frame, VideoDetectionResult, VideoSegment, VideoSeverity, issues,
};

use crate::detectors::VideoDetector;
use crate::imageops::Gray;
use crate::imageops::filter::{mse, resize_gray};
use crate::imageops::stats::{hist_correlation, histogram256, mean};

use super::{ratio_severity, resolve_timestamps};

/// How consecutive-frame similarity is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMethod {
    /// Correlation of gray histograms, mapped to [0, 1].
    #[default]
    Histogram,
    /// Inverted MSE over a 160x120 thumbnail.
    Mse,
}

#[derive(Debug, Clone)]
pub struct FreezeOptions {
    pub similarity_threshold: f64,
    pub min_freeze_frames: usize,
    pub min_freeze_duration: f64,
    pub method: SimilarityMethod,
    /// Black frames terminate freeze runs instead of extending them.
    pub ignore_black_frames: bool,
    pub black_threshold: f64,
}

impl Default for FreezeOptions {
    fn default() -> Self {
        FreezeOptions {
            similarity_threshold: 0.98,
            min_freeze_frames: 30,
            min_freeze_duration: 1.0,
            method: SimilarityMethod::Histogram,
            ignore_black_frames: true,
            black_threshold: 10.0,
        }
    }
}

#[derive(Default)]
pub struct FreezeDetector {
    options: FreezeOptions,
}

impl FreezeDetector {
    pub fn new(options: FreezeOptions) -> Self {
        FreezeDetector { options }
    }

    fn similarity(&self, a: &Gray, b: &Gray) -> f64 {
        match self.options.method {
            SimilarityMethod::Histogram => {
                let corr =
                    hist_correlation(&histogram256(a.data()), &histogram256(b.data()));
                (corr + 1.0) / 2.0
            }
            SimilarityMethod::Mse => {
                let small_a = resize_gray(a, 160, 120);
                let small_b = resize_gray(b, 160, 120);
                (1.0 - mse(&small_a, &small_b) / 65025.0).max(0.0)
            }
        }
    }

    fn segment(
        &self,
        start_frame: usize,
        end_frame: usize,
        timestamps: &[f64],
    ) -> VideoSegment {
        let mut segment = VideoSegment::new(
            start_frame,
            end_frame,
            timestamps[start_frame],
            timestamps[end_frame],
            0.95,
        );
        segment.metadata.insert(
            "freeze_frames".into(),
            (end_frame - start_frame + 1).into(),
        );
        segment
    }
}

impl VideoDetector for FreezeDetector {
    fn name(&self) -> &'static str {
        "freeze"
    }

    fn detect(&self, frames: &[Frame], fps: f64, timestamps: &[f64]) -> VideoDetectionResult {
        let start = Instant::now();
        let opts = &self.options;
        let timestamps = resolve_timestamps(frames.len(), fps, timestamps);

        let mut segments: Vec<VideoSegment> = Vec::new();
        let mut similarity_sum = 0.0;
        let mut similarity_count = 0usize;

        if frames.len() >= 2 {
            let grays: Vec<Gray> = frames.iter().map(Gray::from_frame).collect();
            let mut freeze_start: Option<usize> = None;
            let mut consecutive = 0usize;

            let mut flush = |start_idx: Option<usize>, end_idx: usize, run: usize| {
                if run >= opts.min_freeze_frames
                    && let Some(s) = start_idx
                {
                    let segment = self.segment(s, end_idx, &timestamps);
                    if segment.duration >= opts.min_freeze_duration {
                        segments.push(segment);
                    }
                }
            };

            for i in 1..grays.len() {
                if opts.ignore_black_frames
                    && (mean(grays[i - 1].data()) < opts.black_threshold
                        || mean(grays[i].data()) < opts.black_threshold)
                {
                    flush(freeze_start, i - 1, consecutive);
                    freeze_start = None;
                    consecutive = 0;
                    continue;
                }

                let similarity = self.similarity(&grays[i - 1], &grays[i]);
                similarity_sum += similarity;
                similarity_count += 1;

                if similarity > opts.similarity_threshold {
                    if freeze_start.is_none() {
                        freeze_start = Some(i - 1);
                    }
                    consecutive += 1;
                } else {
                    flush(freeze_start, i - 1, consecutive);
                    freeze_start = None;
                    consecutive = 0;
                }
            }
            flush(freeze_start, grays.len() - 1, consecutive);
        }

        let total_freeze: f64 = segments.iter().map(|s| s.duration).sum();
        let max_freeze = segments.iter().map(|s| s.duration).fold(0.0, f64::max);
        let avg_similarity = if similarity_count > 0 {
            similarity_sum / similarity_count as f64
        } else {
            0.0
        };
        let is_abnormal = !segments.is_empty();

        let mut evidence = Evidence::new();
        evidence.insert("freeze_count".into(), segments.len().into());
        evidence.insert("total_freeze_duration".into(), total_freeze.into());
        evidence.insert("max_freeze_duration".into(), max_freeze.into());
        evidence.insert("avg_similarity".into(), avg_similarity.into());
        evidence.insert(
            "similarity_threshold".into(),
            opts.similarity_threshold.into(),
        );

        let explanation = if is_abnormal {
            format!(
                "Detected {} frozen stretch(es), {total_freeze:.2} s frozen in total",
                segments.len()
            )
        } else {
            "No frozen frames detected".to_string()
        };

        VideoDetectionResult {
            detector_name: self.name().to_string(),
            issue_type: if is_abnormal {
                issues::FREEZE.to_string()
            } else {
                "normal".to_string()
            },
            is_abnormal,
            score: total_freeze,
            threshold: opts.min_freeze_duration,
            confidence: if is_abnormal { 0.95 } else { 1.0 },
            severity: if is_abnormal {
                ratio_severity(total_freeze, opts.min_freeze_duration)
            } else {
                VideoSeverity::Normal
            },
            segments,
            explanation,
            suggestions: if is_abnormal {
                vec![
                    "Check the video source device".to_string(),
                    "Check transmission stability".to_string(),
                    "Check encoder settings".to_string(),
                ]
            } else {
                Vec::new()
            },
            possible_causes: if is_abnormal {
                vec![
                    "Camera device fault".to_string(),
                    "Network transmission interruption".to_string(),
                    "Encoder processing stall".to_string(),
                    "Storage write problems".to_string(),
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

    fn solid(v: u8) -> Frame {
        Frame::filled(32, 32, v, v, v)
    }

    fn varying(i: usize) -> Frame {
        // Distinct histograms frame to frame.
        solid((40 + (i % 8) * 25) as u8)
    }

    fn opts(frames: usize, duration: f64) -> FreezeOptions {
        FreezeOptions {
            min_freeze_frames: frames,
            min_freeze_duration: duration,
            ..FreezeOptions::default()
        }
    }

    #[test]
    fn identical_frames_form_one_segment() {
        let detector = FreezeDetector::new(opts(10, 0.1));
        let frames: Vec<Frame> = (0..60).map(|_| solid(120)).collect();
        let result = detector.detect(&frames, 30.0, &[]);
        assert!(result.is_abnormal);
        assert_eq!(result.segments.len(), 1);
        let segment = &result.segments[0];
        assert_eq!(segment.start_frame, 0);
        assert_eq!(segment.end_frame, 59);
        assert!((segment.duration - 59.0 / 30.0).abs() < 1e-6);
    }

    #[test]
    fn freeze_in_the_middle_is_localized() {
        let detector = FreezeDetector::new(FreezeOptions::default());
        let mut frames: Vec<Frame> = (0..30).map(varying).collect();
        frames.extend((0..60).map(|_| solid(120)));
        frames.extend((0..30).map(varying));
        let result = detector.detect(&frames, 30.0, &[]);
        assert!(result.is_abnormal);
        assert_eq!(result.segments.len(), 1);
        let segment = &result.segments[0];
        assert!((segment.start_time - 1.0).abs() < 0.05, "{}", segment.start_time);
        assert!((segment.end_time - 89.0 / 30.0).abs() < 0.05, "{}", segment.end_time);
        assert!(segment.duration >= 1.9);
        assert!(segment.is_well_formed());
    }

    #[test]
    fn varying_frames_are_clean() {
        let detector = FreezeDetector::new(FreezeOptions::default());
        let frames: Vec<Frame> = (0..90).map(varying).collect();
        let result = detector.detect(&frames, 30.0, &[]);
        assert!(!result.is_abnormal);
        assert!(result.segments.is_empty());
        assert_eq!(result.severity, VideoSeverity::Normal);
    }

    #[test]
    fn black_frames_break_freeze_runs() {
        let detector = FreezeDetector::new(opts(10, 0.1));
        // Identical black frames must not register as a freeze.
        let frames: Vec<Frame> = (0..60).map(|_| solid(0)).collect();
        let result = detector.detect(&frames, 30.0, &[]);
        assert!(!result.is_abnormal);
    }

    #[test]
    fn too_short_runs_are_ignored() {
        let detector = FreezeDetector::new(FreezeOptions::default());
        let mut frames: Vec<Frame> = (0..20).map(varying).collect();
        frames.extend((0..15).map(|_| solid(120)));
        frames.extend((20..40).map(varying));
        let result = detector.detect(&frames, 30.0, &[]);
        assert!(!result.is_abnormal);
    }
}
