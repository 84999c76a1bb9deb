//! Shake detection: global motion between consecutive frames, tracked on
//! corner points and judged by the variance of motion magnitudes.

use std::time::Instant;

use argus_model::{
    Evidence, EvidenceValue, Frame, VideoDetectionResult, VideoSegment, VideoSeverity, issues,
};

use crate::detectors::VideoDetector;
use crate::imageops::Gray;
use crate::imageops::motion::{Point, estimate_motion, good_corners};

use super::{ratio_severity, resolve_timestamps};

#[derive(Debug, Clone)]
pub struct ShakeOptions {
    /// Per-pair mean motion magnitude (pixels) marking a shake frame.
    pub motion_threshold: f64,
    /// Variance of magnitudes above which the clip is abnormal.
    pub variance_threshold: f64,
    pub min_shake_duration: f64,
    pub feature_count: usize,
    pub min_feature_distance: usize,
    /// Tracking points are re-seeded after this many frames.
    pub reseed_interval: usize,
    /// ... or once fewer than this many points survive.
    pub min_tracked_points: usize,
    /// Block-matching template radius.
    pub patch_radius: usize,
    /// Block-matching search radius.
    pub search_radius: usize,
    /// Frame gaps up to this size merge adjacent shake runs.
    pub merge_gap: usize,
}

impl Default for ShakeOptions {
    fn default() -> Self {
        ShakeOptions {
            motion_threshold: 5.0,
            variance_threshold: 10.0,
            min_shake_duration: 0.5,
            feature_count: 100,
            min_feature_distance: 10,
            reseed_interval: 30,
            min_tracked_points: 10,
            patch_radius: 4,
            search_radius: 8,
            merge_gap: 5,
        }
    }
}

#[derive(Default)]
pub struct ShakeDetector {
    options: ShakeOptions,
}

impl ShakeDetector {
    pub fn new(options: ShakeOptions) -> Self {
        ShakeDetector { options }
    }

    fn shake_segments(
        &self,
        shake_frames: &[usize],
        timestamps: &[f64],
    ) -> Vec<VideoSegment> {
        let mut segments = Vec::new();
        if shake_frames.is_empty() {
            return segments;
        }
        let mut run_start = shake_frames[0];
        let mut run_end = shake_frames[0];
        let mut push = |start: usize, end: usize, segments: &mut Vec<VideoSegment>| {
            if end > start {
                let mut segment = VideoSegment::new(
                    start,
                    end,
                    timestamps[start],
                    timestamps[end],
                    0.85,
                );
                if segment.duration >= self.options.min_shake_duration {
                    segment
                        .metadata
                        .insert("shake_frames".into(), (end - start + 1).into());
                    segments.push(segment);
                }
            }
        };
        for &frame in &shake_frames[1..] {
            if frame - run_end <= self.options.merge_gap {
                run_end = frame;
            } else {
                push(run_start, run_end, &mut segments);
                run_start = frame;
                run_end = frame;
            }
        }
        push(run_start, run_end, &mut segments);
        segments
    }
}

impl VideoDetector for ShakeDetector {
    fn name(&self) -> &'static str {
        "shake"
    }

    fn detect(&self, frames: &[Frame], fps: f64, timestamps: &[f64]) -> VideoDetectionResult {
        let start = Instant::now();
        let opts = &self.options;
        let timestamps = resolve_timestamps(frames.len(), fps, timestamps);

        let mut magnitudes: Vec<f64> = Vec::new();
        let mut motion_samples: Vec<f64> = Vec::new();
        let mut shake_frames: Vec<usize> = Vec::new();

        if frames.len() >= 2 {
            let mut prev_gray = Gray::from_frame(&frames[0]);
            let mut points: Vec<Point> =
                good_corners(&prev_gray, opts.feature_count, opts.min_feature_distance);

            for (i, frame) in frames.iter().enumerate().skip(1) {
                let curr_gray = Gray::from_frame(frame);

                if !points.is_empty() {
                    let (motion, survivors) = estimate_motion(
                        &prev_gray,
                        &curr_gray,
                        &points,
                        opts.patch_radius,
                        opts.search_radius,
                    );
                    if let Some((dx, dy)) = motion {
                        let magnitude = (dx * dx + dy * dy).sqrt();
                        magnitudes.push(magnitude);
                        if motion_samples.len() < 40 {
                            motion_samples.push(dx);
                            motion_samples.push(dy);
                        }
                        if magnitude > opts.motion_threshold {
                            shake_frames.push(i);
                        }
                    }
                    points = survivors;
                }

                if i % opts.reseed_interval == 0 || points.len() < opts.min_tracked_points {
                    points = good_corners(
                        &curr_gray,
                        opts.feature_count,
                        opts.min_feature_distance,
                    );
                }
                prev_gray = curr_gray;
            }
        }

        let (variance, max_motion, avg_motion) = if magnitudes.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let n = magnitudes.len() as f64;
            let mean = magnitudes.iter().sum::<f64>() / n;
            let variance =
                magnitudes.iter().map(|m| (m - mean) * (m - mean)).sum::<f64>() / n;
            let max = magnitudes.iter().cloned().fold(0.0, f64::max);
            (variance, max, mean)
        };

        let segments = self.shake_segments(&shake_frames, &timestamps);
        let is_abnormal = variance > opts.variance_threshold;

        let mut evidence = Evidence::new();
        evidence.insert("motion_variance".into(), variance.into());
        evidence.insert("max_motion".into(), max_motion.into());
        evidence.insert("avg_motion".into(), avg_motion.into());
        evidence.insert("shake_frame_count".into(), shake_frames.len().into());
        evidence.insert(
            "shake_ratio".into(),
            (shake_frames.len() as f64 / frames.len().max(1) as f64).into(),
        );
        evidence.insert(
            "motion_samples".into(),
            EvidenceValue::Numbers(motion_samples),
        );

        let explanation = if is_abnormal {
            let total: f64 = segments.iter().map(|s| s.duration).sum();
            format!(
                "Video shake detected: motion variance {variance:.2} (threshold {:.1}), \
                 {} shaky stretch(es) totalling {total:.2} s",
                opts.variance_threshold,
                segments.len()
            )
        } else {
            format!(
                "Picture is stable: motion variance {variance:.2} (threshold {:.1})",
                opts.variance_threshold
            )
        };

        VideoDetectionResult {
            detector_name: self.name().to_string(),
            issue_type: if is_abnormal {
                issues::SHAKE.to_string()
            } else {
                "normal".to_string()
            },
            is_abnormal,
            score: variance,
            threshold: opts.variance_threshold,
            confidence: 0.85,
            severity: if is_abnormal {
                ratio_severity(variance, opts.variance_threshold)
            } else {
                VideoSeverity::Normal
            },
            segments,
            explanation,
            suggestions: if is_abnormal {
                vec![
                    "Check that the camera is firmly mounted".to_string(),
                    "Check the mounting bracket".to_string(),
                    "Enable stabilization or use a sturdier mount".to_string(),
                    "Check for wind or vibration sources".to_string(),
                ]
            } else {
                Vec::new()
            },
            possible_causes: if is_abnormal {
                vec![
                    "Loose camera mount".to_string(),
                    "Vibration at the installation point".to_string(),
                    "Wind load".to_string(),
                    "Human interference".to_string(),
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

    fn textured_shifted(shift: usize) -> Frame {
        let mut frame = Frame::filled(64, 64, 0, 0, 0);
        for y in 0..64usize {
            for x in 0..64usize {
                let sx = (x + 64 - shift) % 64;
                let v = (((sx / 4) * 37 + (y / 4) * 71) % 251) as u8;
                frame.set_pixel(x as u32, y as u32, [v, v, v]);
            }
        }
        frame
    }

    #[test]
    fn static_clip_is_stable() {
        let detector = ShakeDetector::new(ShakeOptions::default());
        let frames: Vec<Frame> = (0..40).map(|_| textured_shifted(0)).collect();
        let result = detector.detect(&frames, 30.0, &[]);
        assert!(!result.is_abnormal, "variance = {}", result.score);
        assert_eq!(result.severity, VideoSeverity::Normal);
    }

    #[test]
    fn oscillating_clip_shakes() {
        let detector = ShakeDetector::new(ShakeOptions::default());
        // Jerky displacement pattern: jumps of 8 px interleaved with
        // still pairs, so motion magnitudes swing between 0 and 8.
        let shifts = [0usize, 8, 8, 0];
        let frames: Vec<Frame> = (0..60)
            .map(|i| textured_shifted(shifts[i % shifts.len()]))
            .collect();
        let result = detector.detect(&frames, 30.0, &[]);
        assert!(result.is_abnormal, "variance = {}", result.score);
        assert!(!result.segments.is_empty());
        for segment in &result.segments {
            assert!(segment.is_well_formed());
        }
    }

    #[test]
    fn smooth_pan_is_not_shake() {
        let detector = ShakeDetector::new(ShakeOptions::default());
        // Constant 1-pixel drift: motion exists but the variance is low.
        let frames: Vec<Frame> = (0..40).map(|i| textured_shifted(i % 64)).collect();
        let result = detector.detect(&frames, 30.0, &[]);
        assert!(!result.is_abnormal, "variance = {}", result.score);
    }
}
