//! Signal-loss detection: black, white, and solid-color frames, plus the
//! color-bar test card at depth.

use std::time::Instant;

use argus_config::Thresholds;
use argus_model::{DetectionLevel, Evidence, Finding, Frame, Severity, issues};

use crate::imageops::Gray;
use crate::imageops::color::hsv_planes;
use crate::imageops::gradients::{EDGE_THRESHOLD, edge_density};
use crate::imageops::stats::{mean_std, min_max};

use super::{Detector, DetectorMetadata, elapsed_ms};

pub static METADATA: DetectorMetadata = DetectorMetadata {
    name: "signal_loss",
    display_name: "Signal loss",
    description: "Detects lost video signals: black, white, and solid-color frames",
    version: "1.0.0",
    priority: 10,
    supported_levels: &[
        DetectionLevel::Fast,
        DetectionLevel::Standard,
        DetectionLevel::Deep,
    ],
    suppresses: &[
        issues::TOO_DARK,
        issues::BLUR,
        issues::LOW_CONTRAST,
        issues::NO_TEXTURE,
        issues::NOISE,
    ],
};

const WHITE_MEAN_MIN: f64 = 250.0;
const SOLID_STD_MAX: f64 = 3.0;

pub struct SignalLossDetector {
    black_threshold: f64,
}

impl SignalLossDetector {
    pub fn new(thresholds: &Thresholds) -> Self {
        SignalLossDetector {
            black_threshold: thresholds.black_screen_threshold,
        }
    }

    /// The classic "no signal" card: a handful of distinct hues arranged
    /// in vertical bars, so rows look alike while hues vary.
    fn has_color_bar_pattern(frame: &Frame) -> bool {
        let hsv = hsv_planes(frame);
        let mut seen = [false; 9];
        for &h in &hsv.h {
            seen[(h as usize / 20).min(8)] = true;
        }
        let distinct_hues = seen.iter().filter(|&&s| s).count();
        if distinct_hues < 5 {
            return false;
        }

        // Rows of a bar pattern are near-identical: row means barely vary
        // down each channel.
        let w = frame.width() as usize;
        let h = frame.height() as usize;
        if h < 2 {
            return false;
        }
        for c in 0..3 {
            let mut means = Vec::with_capacity(h);
            for y in 0..h {
                let mut sum = 0u64;
                for x in 0..w {
                    sum += frame.data()[(y * w + x) * 3 + c] as u64;
                }
                means.push(sum as f64 / w.max(1) as f64);
            }
            let mean = means.iter().sum::<f64>() / means.len() as f64;
            let var =
                means.iter().map(|m| (m - mean) * (m - mean)).sum::<f64>() / means.len() as f64;
            if var.sqrt() >= 10.0 {
                return false;
            }
        }
        true
    }
}

impl Detector for SignalLossDetector {
    fn metadata(&self) -> &DetectorMetadata {
        &METADATA
    }

    fn detect(&self, frame: &Frame, level: DetectionLevel) -> Finding {
        let start = Instant::now();
        let gray = Gray::from_frame(frame);

        let (mean, std) = mean_std(gray.data());
        let (min_v, max_v) = min_max(gray.data());

        let is_black = mean < self.black_threshold;
        let is_white = mean > WHITE_MEAN_MIN && std < SOLID_STD_MAX;
        let is_solid = std < SOLID_STD_MAX && !is_black && !is_white;
        let is_abnormal = is_black || is_white || is_solid;

        let (issue_type, score, threshold) = if is_black {
            (issues::BLACK_SCREEN.to_string(), mean, self.black_threshold)
        } else if is_white {
            (issues::WHITE_SCREEN.to_string(), 255.0 - mean, 5.0)
        } else if is_solid {
            (issues::SOLID_COLOR.to_string(), std, SOLID_STD_MAX)
        } else {
            (issues::normal_for(METADATA.name), mean, self.black_threshold)
        };

        let confidence = if is_black {
            ((self.black_threshold - mean) / self.black_threshold).min(1.0)
        } else if is_white {
            ((mean - WHITE_MEAN_MIN) / (255.0 - WHITE_MEAN_MIN)).min(1.0)
        } else if is_solid {
            ((SOLID_STD_MAX - std) / SOLID_STD_MAX).min(1.0)
        } else {
            (mean / 128.0).min(1.0)
        };

        let severity = if !is_abnormal {
            Severity::Normal
        } else if is_black && mean < 3.0 {
            Severity::Critical
        } else {
            Severity::Warning
        };

        let mut evidence = Evidence::new();
        evidence.insert("mean_brightness".into(), mean.into());
        evidence.insert("std_brightness".into(), std.into());
        evidence.insert("min_brightness".into(), (min_v as f64).into());
        evidence.insert("max_brightness".into(), (max_v as f64).into());
        evidence.insert("is_black_screen".into(), is_black.into());
        evidence.insert("is_white_screen".into(), is_white.into());
        evidence.insert("is_solid_color".into(), is_solid.into());
        evidence.insert("black_threshold".into(), self.black_threshold.into());

        if level == DetectionLevel::Deep {
            evidence.insert(
                "edge_ratio".into(),
                edge_density(&gray, EDGE_THRESHOLD).into(),
            );
            evidence.insert(
                "has_no_signal_pattern".into(),
                Self::has_color_bar_pattern(frame).into(),
            );
            if !is_black {
                let mut sums = [0u64; 3];
                for chunk in frame.data().chunks_exact(3) {
                    sums[0] += chunk[0] as u64;
                    sums[1] += chunk[1] as u64;
                    sums[2] += chunk[2] as u64;
                }
                let n = frame.len().max(1) as f64;
                let mut dominant = argus_model::Evidence::new();
                dominant.insert("b".into(), (sums[0] as f64 / n).into());
                dominant.insert("g".into(), (sums[1] as f64 / n).into());
                dominant.insert("r".into(), (sums[2] as f64 / n).into());
                evidence.insert(
                    "dominant_color".into(),
                    argus_model::EvidenceValue::Map(dominant),
                );
            }
        }

        let explanation = match issue_type.as_str() {
            issues::BLACK_SCREEN => {
                format!("Black screen detected; mean brightness {mean:.1}")
            }
            issues::WHITE_SCREEN => {
                format!("White screen detected; mean brightness {mean:.1}")
            }
            issues::SOLID_COLOR => {
                "Solid-color frame detected; the signal is likely faulty".to_string()
            }
            _ => "Signal is normal".to_string(),
        };

        let possible_causes = match issue_type.as_str() {
            issues::BLACK_SCREEN => vec![
                "Camera power failure".to_string(),
                "Video cable disconnected".to_string(),
                "Lens fully covered".to_string(),
                "Encoder failure".to_string(),
                "Network interruption".to_string(),
            ],
            issues::WHITE_SCREEN => vec![
                "Direct strong light".to_string(),
                "Runaway exposure".to_string(),
                "Sensor fault".to_string(),
            ],
            issues::SOLID_COLOR => vec![
                "Faulty signal source".to_string(),
                "Encode/decode problem".to_string(),
                "Hardware fault".to_string(),
            ],
            _ => Vec::new(),
        };

        let suggestions = match issue_type.as_str() {
            issues::BLACK_SCREEN => vec![
                "Check camera power".to_string(),
                "Check video cabling".to_string(),
                "Check network connectivity".to_string(),
                "Restart the camera".to_string(),
                "Check for obstructions".to_string(),
            ],
            issues::WHITE_SCREEN => vec![
                "Check for strong light sources".to_string(),
                "Adjust camera exposure".to_string(),
                "Check the sensor".to_string(),
            ],
            issues::SOLID_COLOR => vec![
                "Check the signal source".to_string(),
                "Restart the involved devices".to_string(),
                "Check the encoder".to_string(),
            ],
            _ => Vec::new(),
        };

        Finding {
            detector_name: METADATA.name.to_string(),
            issue_type,
            is_abnormal,
            score,
            threshold,
            confidence: confidence.max(0.0),
            severity,
            explanation,
            possible_causes,
            suggestions,
            evidence,
            process_time_ms: elapsed_ms(start),
            detection_level: level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_frame_is_critical_signal_loss() {
        let detector = SignalLossDetector::new(&Thresholds::default());
        let finding = detector.detect(&Frame::filled(64, 64, 0, 0, 0), DetectionLevel::Standard);
        assert!(finding.is_abnormal);
        assert_eq!(finding.issue_type, issues::BLACK_SCREEN);
        assert_eq!(finding.severity, Severity::Critical);
        assert!(finding.is_well_formed());
    }

    #[test]
    fn white_frame_is_a_white_screen() {
        let detector = SignalLossDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(64, 64, 255, 255, 255), DetectionLevel::Standard);
        assert_eq!(finding.issue_type, issues::WHITE_SCREEN);
        assert_eq!(finding.severity, Severity::Warning);
    }

    #[test]
    fn mid_gray_uniform_frame_is_solid_color() {
        let detector = SignalLossDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(64, 64, 128, 128, 128), DetectionLevel::Standard);
        assert_eq!(finding.issue_type, issues::SOLID_COLOR);
        assert_eq!(finding.severity, Severity::Warning);
    }

    #[test]
    fn textured_frame_is_normal() {
        let detector = SignalLossDetector::new(&Thresholds::default());
        let mut frame = Frame::filled(64, 64, 0, 0, 0);
        for y in 0..64 {
            for x in 0..64 {
                let v = ((x * 3 + y * 5) % 256) as u8;
                frame.set_pixel(x, y, [v, v, v]);
            }
        }
        let finding = detector.detect(&frame, DetectionLevel::Standard);
        assert!(!finding.is_abnormal);
    }

    #[test]
    fn deep_level_spots_the_color_bar_card() {
        let detector = SignalLossDetector::new(&Thresholds::default());
        // Seven vertical bars of distinct saturated hues.
        let bars: [[u8; 3]; 7] = [
            [255, 255, 255],
            [0, 255, 255],
            [255, 255, 0],
            [0, 255, 0],
            [255, 0, 255],
            [0, 0, 255],
            [255, 0, 0],
        ];
        let mut frame = Frame::filled(70, 48, 0, 0, 0);
        for y in 0..48 {
            for x in 0..70 {
                frame.set_pixel(x, y, bars[(x / 10) as usize]);
            }
        }
        let finding = detector.detect(&frame, DetectionLevel::Deep);
        assert_eq!(
            finding.evidence["has_no_signal_pattern"].as_bool(),
            Some(true)
        );
    }
}
