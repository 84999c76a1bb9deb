//! Color fault detection: blue/green screens, grayscale frames, and
//! camera-wide color casts.
//!
//! Before a color cast is reported, large pure-color regions (low local
//! variance, high saturation, concentrated hue) are discounted: they are
//! almost always physical objects in the scene, not a white-balance
//! fault. Above half the frame the cast check is skipped outright.

use std::time::Instant;

use argus_config::Thresholds;
use argus_model::{DetectionLevel, Evidence, Finding, Frame, Severity, issues};

use crate::imageops::Gray;
use crate::imageops::color::{
    HsvPlanes, channel_means, channel_means_masked, hsv_planes, hue_histogram, hue_range_ratio,
};
use crate::imageops::filter::local_mean_std;
use crate::imageops::stats::mean;

use super::{Detector, DetectorMetadata, elapsed_ms};

pub static METADATA: DetectorMetadata = DetectorMetadata {
    name: "color",
    display_name: "Image color",
    description: "Detects color casts, grayscale frames, and blue/green screens",
    version: "1.1.0",
    priority: 20,
    supported_levels: &[
        DetectionLevel::Fast,
        DetectionLevel::Standard,
        DetectionLevel::Deep,
    ],
    suppresses: &[issues::COLOR_CAST, issues::LOW_SATURATION],
};

// HSV calibration ranges (hue in 0..180).
const BLUE_HUE: (u8, u8) = (100, 130);
const GREEN_HUE: (u8, u8) = (35, 85);
const SOLID_SCREEN_RATIO: f64 = 0.8;

// Pure-color region bounds.
const PURE_LOCAL_STD_MAX: f64 = 10.0;
const PURE_SATURATION_MIN: u8 = 120;
const PURE_HUE_WINDOW: usize = 10;
const PURE_HUE_CONCENTRATION: f64 = 0.7;
const PURE_ADJUST_RATIO: f64 = 0.2;
const PURE_SUPPRESS_RATIO: f64 = 0.5;
const TIGHTENED_THRESHOLD_FACTOR: f64 = 0.8;

pub struct ColorDetector {
    saturation_min: f64,
    cast_threshold: f64,
}

struct CastAssessment {
    is_cast: bool,
    deviation: f64,
    pure_ratio: f64,
    adjusted: bool,
}

impl ColorDetector {
    pub fn new(thresholds: &Thresholds) -> Self {
        ColorDetector {
            saturation_min: thresholds.saturation_min,
            cast_threshold: thresholds.color_cast_threshold,
        }
    }

    /// Pixels belonging to a large stable saturated region with one
    /// dominant hue, plus the fraction of the frame they cover.
    fn pure_color_mask(&self, gray: &Gray, hsv: &HsvPlanes) -> (Vec<bool>, f64) {
        let total = gray.len();
        let (_, local_stds) = local_mean_std(gray, 15);

        let mut candidate = vec![false; total];
        let mut count = 0usize;
        for i in 0..total {
            if local_stds[i] < PURE_LOCAL_STD_MAX && hsv.s[i] >= PURE_SATURATION_MIN {
                candidate[i] = true;
                count += 1;
            }
        }
        if count == 0 {
            return (candidate, 0.0);
        }

        // Require the candidate region to be hue-concentrated; scattered
        // colorful texture is not an occluding object.
        let mut hist = [0u64; 180];
        for i in 0..total {
            if candidate[i] {
                hist[hsv.h[i] as usize] += 1;
            }
        }
        let peak = hist
            .iter()
            .enumerate()
            .max_by_key(|&(_, &c)| c)
            .map(|(h, _)| h)
            .unwrap_or(0);
        let mut window_count = 0u64;
        for (h, &c) in hist.iter().enumerate() {
            let dist = (h as isize - peak as isize).unsigned_abs();
            if dist <= PURE_HUE_WINDOW || 180 - dist <= PURE_HUE_WINDOW {
                window_count += c;
            }
        }
        if (window_count as f64 / count as f64) < PURE_HUE_CONCENTRATION {
            return (vec![false; total], 0.0);
        }
        (candidate, count as f64 / total as f64)
    }

    fn assess_cast(&self, frame: &Frame, gray: &Gray, hsv: &HsvPlanes) -> CastAssessment {
        let (b, g, r) = channel_means(frame);
        let avg = (b + g + r) / 3.0;
        let deviation = (b - avg).abs().max((g - avg).abs()).max((r - avg).abs());

        if deviation <= self.cast_threshold {
            return CastAssessment {
                is_cast: false,
                deviation,
                pure_ratio: 0.0,
                adjusted: false,
            };
        }

        let (mask, pure_ratio) = self.pure_color_mask(gray, hsv);
        if pure_ratio > PURE_SUPPRESS_RATIO {
            // The frame is mostly one saturated object; a global cast
            // verdict would be meaningless.
            return CastAssessment {
                is_cast: false,
                deviation,
                pure_ratio,
                adjusted: false,
            };
        }
        if pure_ratio > PURE_ADJUST_RATIO {
            let (mb, mg, mr) = channel_means_masked(frame, &mask);
            let mavg = (mb + mg + mr) / 3.0;
            let adjusted_dev =
                (mb - mavg).abs().max((mg - mavg).abs()).max((mr - mavg).abs());
            return CastAssessment {
                is_cast: adjusted_dev > self.cast_threshold * TIGHTENED_THRESHOLD_FACTOR,
                deviation: adjusted_dev,
                pure_ratio,
                adjusted: true,
            };
        }
        CastAssessment {
            is_cast: true,
            deviation,
            pure_ratio,
            adjusted: false,
        }
    }
}

impl Detector for ColorDetector {
    fn metadata(&self) -> &DetectorMetadata {
        &METADATA
    }

    fn detect(&self, frame: &Frame, level: DetectionLevel) -> Finding {
        let start = Instant::now();
        let gray = Gray::from_frame(frame);
        let hsv = hsv_planes(frame);

        let mean_saturation = mean(&hsv.s);
        let (b_mean, g_mean, r_mean) = channel_means(frame);
        let rgb_avg = (b_mean + g_mean + r_mean) / 3.0;

        let blue_ratio = hue_range_ratio(&hsv, BLUE_HUE.0, BLUE_HUE.1, 100);
        let green_ratio = hue_range_ratio(&hsv, GREEN_HUE.0, GREEN_HUE.1, 100);
        let blue_confidence = if blue_ratio > 0.5 {
            (blue_ratio / SOLID_SCREEN_RATIO).min(1.0)
        } else {
            0.0
        };
        let green_confidence = if green_ratio > 0.5 {
            (green_ratio / SOLID_SCREEN_RATIO).min(1.0)
        } else {
            0.0
        };
        let is_blue_screen = blue_ratio > SOLID_SCREEN_RATIO;
        let is_green_screen = green_ratio > SOLID_SCREEN_RATIO;

        let is_grayscale = mean_saturation < self.saturation_min;
        let cast = self.assess_cast(frame, &gray, &hsv);

        let mut evidence = Evidence::new();
        evidence.insert("mean_saturation".into(), mean_saturation.into());
        evidence.insert("b_channel_mean".into(), b_mean.into());
        evidence.insert("g_channel_mean".into(), g_mean.into());
        evidence.insert("r_channel_mean".into(), r_mean.into());
        evidence.insert("rgb_average".into(), rgb_avg.into());
        evidence.insert("max_channel_deviation".into(), cast.deviation.into());
        evidence.insert("is_grayscale".into(), is_grayscale.into());
        evidence.insert("is_color_cast".into(), cast.is_cast.into());
        evidence.insert("blue_screen_confidence".into(), blue_confidence.into());
        evidence.insert("green_screen_confidence".into(), green_confidence.into());
        evidence.insert("pure_color_ratio".into(), cast.pure_ratio.into());
        evidence.insert("deviation_adjusted".into(), cast.adjusted.into());

        if level == DetectionLevel::Deep {
            let hue_hist = hue_histogram(&hsv);
            let total: u64 = hue_hist.iter().sum();
            let (dominant_hue, peak) = hue_hist
                .iter()
                .enumerate()
                .max_by_key(|&(_, &c)| c)
                .map(|(h, &c)| (h, c))
                .unwrap_or((0, 0));
            evidence.insert("dominant_hue".into(), dominant_hue.into());
            if total > 0 {
                evidence.insert(
                    "hue_concentration".into(),
                    (peak as f64 / total as f64).into(),
                );
            }
            let temp = if r_mean > b_mean * 1.2 {
                "warm"
            } else if b_mean > r_mean * 1.2 {
                "cool"
            } else {
                "neutral"
            };
            evidence.insert("estimated_color_temp".into(), temp.into());
        }

        // Priority within the detector: solid screens, then grayscale,
        // then cast.
        let (issue_type, is_abnormal, severity, confidence, score, threshold) =
            if is_blue_screen || is_green_screen {
                let (issue, conf, ratio) = if is_blue_screen {
                    (issues::BLUE_SCREEN, blue_confidence, blue_ratio)
                } else {
                    (issues::GREEN_SCREEN, green_confidence, green_ratio)
                };
                (
                    issue.to_string(),
                    true,
                    Severity::Critical,
                    conf,
                    ratio,
                    SOLID_SCREEN_RATIO,
                )
            } else if is_grayscale {
                let severity = if mean_saturation < 3.0 {
                    Severity::Critical
                } else if mean_saturation < self.saturation_min * 0.5 {
                    Severity::Warning
                } else {
                    Severity::Info
                };
                let confidence =
                    ((self.saturation_min - mean_saturation) / self.saturation_min).min(1.0);
                (
                    issues::GRAYSCALE.to_string(),
                    true,
                    severity,
                    confidence,
                    mean_saturation,
                    self.saturation_min,
                )
            } else if cast.is_cast {
                let severity = if cast.deviation > self.cast_threshold * 2.0 {
                    Severity::Warning
                } else {
                    Severity::Info
                };
                let confidence = (cast.deviation / (self.cast_threshold * 2.0)).min(1.0);
                (
                    issues::COLOR_CAST.to_string(),
                    true,
                    severity,
                    confidence,
                    cast.deviation,
                    self.cast_threshold,
                )
            } else {
                (
                    issues::normal_for(METADATA.name),
                    false,
                    Severity::Normal,
                    1.0,
                    cast.deviation,
                    self.cast_threshold,
                )
            };

        let explanation = match issue_type.as_str() {
            issues::BLUE_SCREEN => "Blue screen detected; the frame is filled with blue".into(),
            issues::GREEN_SCREEN => "Green screen detected; the frame is filled with green".into(),
            issues::GRAYSCALE => format!(
                "Mean saturation {mean_saturation:.1}; the frame is effectively grayscale"
            ),
            issues::COLOR_CAST => {
                let tint = if r_mean > g_mean && r_mean > b_mean {
                    "red"
                } else if g_mean > r_mean && g_mean > b_mean {
                    "green"
                } else {
                    "blue"
                };
                format!(
                    "Color cast toward {tint}; channel deviation {:.1}",
                    cast.deviation
                )
            }
            _ => "Image color is normal".into(),
        };

        let possible_causes = match issue_type.as_str() {
            issues::BLUE_SCREEN => vec![
                "Camera signal fault".to_string(),
                "Video encoder failure".to_string(),
                "Loose cabling".to_string(),
                "Camera firmware issue".to_string(),
            ],
            issues::GREEN_SCREEN => vec![
                "Camera signal fault".to_string(),
                "Video encoder failure".to_string(),
                "HDMI/SDI interface problem".to_string(),
            ],
            issues::GRAYSCALE => vec![
                "Camera is in black-and-white mode".to_string(),
                "Night vision is engaged".to_string(),
                "Color sensor fault".to_string(),
                "ISP processing error".to_string(),
            ],
            issues::COLOR_CAST => vec![
                "Incorrect white balance".to_string(),
                "Ambient light color temperature".to_string(),
                "Color calibration drift".to_string(),
                "Sensor aging".to_string(),
            ],
            _ => Vec::new(),
        };

        let suggestions = match issue_type.as_str() {
            issues::BLUE_SCREEN | issues::GREEN_SCREEN => vec![
                "Check camera cabling".to_string(),
                "Restart the camera".to_string(),
                "Check the video encoder".to_string(),
                "Update camera firmware".to_string(),
            ],
            issues::GRAYSCALE => vec![
                "Check whether night mode is engaged".to_string(),
                "Switch the camera to color mode".to_string(),
                "Check ambient lighting".to_string(),
            ],
            issues::COLOR_CAST => vec![
                "Adjust the white balance".to_string(),
                "Enable automatic white balance".to_string(),
                "Check the light sources in the scene".to_string(),
                "Run a color calibration".to_string(),
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
    fn blue_frame_is_a_blue_screen() {
        let detector = ColorDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(64, 64, 255, 0, 0), DetectionLevel::Standard);
        assert!(finding.is_abnormal);
        assert_eq!(finding.issue_type, issues::BLUE_SCREEN);
        assert_eq!(finding.severity, Severity::Critical);
        assert!(finding.is_well_formed());
    }

    #[test]
    fn green_frame_is_a_green_screen() {
        let detector = ColorDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(64, 64, 0, 255, 0), DetectionLevel::Standard);
        assert_eq!(finding.issue_type, issues::GREEN_SCREEN);
    }

    #[test]
    fn gray_frame_is_grayscale() {
        let detector = ColorDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(64, 64, 120, 120, 120), DetectionLevel::Standard);
        assert_eq!(finding.issue_type, issues::GRAYSCALE);
        assert_eq!(finding.severity, Severity::Critical);
    }

    #[test]
    fn tinted_textured_frame_reports_color_cast() {
        let detector = ColorDetector::new(&Thresholds::default());
        // A warm tint over varied luma: saturated enough to escape the
        // grayscale verdict, textured enough to escape the pure-color
        // discount.
        let mut frame = Frame::filled(64, 64, 20, 80, 180);
        for y in 0..64 {
            for x in 0..64 {
                let n = ((x * 13 + y * 29) % 60) as i32;
                let [b, g, r] = frame.pixel(x, y);
                frame.set_pixel(
                    x,
                    y,
                    [
                        (b as i32 + n).clamp(0, 255) as u8,
                        (g as i32 + n).clamp(0, 255) as u8,
                        (r as i32 + n).clamp(0, 255) as u8,
                    ],
                );
            }
        }
        let finding = detector.detect(&frame, DetectionLevel::Standard);
        assert_eq!(finding.issue_type, issues::COLOR_CAST);
    }

    #[test]
    fn large_pure_red_object_discounts_the_cast() {
        let detector = ColorDetector::new(&Thresholds::default());
        // 60% pure bright red block, remainder a busy neutral texture.
        let mut frame = Frame::filled(80, 80, 0, 0, 230);
        for y in 0..80 {
            for x in 48..80 {
                let v = ((x * 31 + y * 17) % 200 + 30) as u8;
                frame.set_pixel(x, y, [v, v, v]);
            }
        }
        let finding = detector.detect(&frame, DetectionLevel::Standard);
        assert_ne!(finding.issue_type, issues::COLOR_CAST);
        let ratio = finding.evidence["pure_color_ratio"].as_number().unwrap();
        assert!(ratio > 0.5, "pure ratio = {ratio}");
    }

    #[test]
    fn deep_level_estimates_color_temperature() {
        let detector = ColorDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(64, 64, 40, 80, 200), DetectionLevel::Deep);
        assert_eq!(
            finding.evidence["estimated_color_temp"].as_text(),
            Some("warm")
        );
    }
}
