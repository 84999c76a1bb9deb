//! Brightness detection: mean intensity against a healthy band.

use std::time::Instant;

use argus_config::Thresholds;
use argus_model::{DetectionLevel, Evidence, Finding, Frame, Severity, issues};

use crate::imageops::Gray;
use crate::imageops::stats::{histogram256, histogram_entropy, mean_std, percentile};

use super::{Detector, DetectorMetadata, elapsed_ms};

pub static METADATA: DetectorMetadata = DetectorMetadata {
    name: "brightness",
    display_name: "Image brightness",
    description: "Detects over- and under-exposed frames",
    version: "1.0.0",
    priority: 30,
    supported_levels: &[
        DetectionLevel::Fast,
        DetectionLevel::Standard,
        DetectionLevel::Deep,
    ],
    suppresses: &[],
};

pub struct BrightnessDetector {
    min: f64,
    max: f64,
}

impl BrightnessDetector {
    pub fn new(thresholds: &Thresholds) -> Self {
        BrightnessDetector {
            min: thresholds.brightness_min,
            max: thresholds.brightness_max,
        }
    }

    fn severity(&self, mean: f64, too_dark: bool, too_bright: bool) -> Severity {
        if too_dark {
            if mean < 5.0 {
                Severity::Critical
            } else if mean < self.min * 0.5 {
                Severity::Warning
            } else {
                Severity::Info
            }
        } else if too_bright {
            if mean > 250.0 {
                Severity::Critical
            } else if mean > self.max + (255.0 - self.max) * 0.5 {
                Severity::Warning
            } else {
                Severity::Info
            }
        } else {
            Severity::Normal
        }
    }

    fn confidence(&self, mean: f64, too_dark: bool, too_bright: bool) -> f64 {
        if too_dark {
            if self.min > 0.0 {
                ((self.min - mean) / self.min).min(1.0)
            } else {
                1.0
            }
        } else if too_bright {
            if self.max < 255.0 {
                ((mean - self.max) / (255.0 - self.max)).min(1.0)
            } else {
                1.0
            }
        } else {
            let range = self.max - self.min;
            if range > 0.0 {
                let margin = (mean - self.min).min(self.max - mean);
                (margin / (range / 2.0)).min(1.0)
            } else {
                1.0
            }
        }
    }
}

impl Detector for BrightnessDetector {
    fn metadata(&self) -> &DetectorMetadata {
        &METADATA
    }

    fn detect(&self, frame: &Frame, level: DetectionLevel) -> Finding {
        let start = Instant::now();
        let gray = Gray::from_frame(frame);

        let (mean, std) = mean_std(gray.data());
        let p5 = percentile(gray.data(), 5.0);
        let p95 = percentile(gray.data(), 95.0);

        let too_dark = mean < self.min;
        let too_bright = mean > self.max;
        let is_abnormal = too_dark || too_bright;

        let (issue_type, threshold) = if too_dark {
            (issues::TOO_DARK.to_string(), self.min)
        } else if too_bright {
            (issues::TOO_BRIGHT.to_string(), self.max)
        } else {
            (issues::normal_for(METADATA.name), self.min)
        };

        let mut evidence = Evidence::new();
        evidence.insert("mean_brightness".into(), mean.into());
        evidence.insert("std_brightness".into(), std.into());
        evidence.insert("percentile_5".into(), p5.into());
        evidence.insert("percentile_95".into(), p95.into());
        evidence.insert("brightness_min_threshold".into(), self.min.into());
        evidence.insert("brightness_max_threshold".into(), self.max.into());

        if level == DetectionLevel::Deep {
            let hist = histogram256(gray.data());
            let total = gray.len().max(1) as f64;
            let dark_ratio: u64 = hist[..30].iter().sum();
            let bright_ratio: u64 = hist[225..].iter().sum();
            evidence.insert("dark_pixel_ratio".into(), (dark_ratio as f64 / total).into());
            evidence.insert(
                "bright_pixel_ratio".into(),
                (bright_ratio as f64 / total).into(),
            );
            evidence.insert("histogram_entropy".into(), histogram_entropy(&hist).into());
        }

        let severity = self.severity(mean, too_dark, too_bright);
        let confidence = self.confidence(mean, too_dark, too_bright).max(0.0);

        let explanation = if too_dark {
            format!(
                "Mean brightness {mean:.1} is below the minimum of {:.1}; frame is too dark",
                self.min
            )
        } else if too_bright {
            format!(
                "Mean brightness {mean:.1} is above the maximum of {:.1}; frame is too bright",
                self.max
            )
        } else {
            format!("Mean brightness {mean:.1}; exposure is normal")
        };

        let possible_causes = if too_dark {
            let mut causes = vec![
                "Insufficient ambient light".to_string(),
                "Exposure set too low".to_string(),
                "Lens obstruction".to_string(),
                "Night mode failed to engage".to_string(),
            ];
            if severity == Severity::Critical {
                causes.push("Camera fault".to_string());
                causes.push("Signal loss".to_string());
                causes.push("Lens cap still on".to_string());
            }
            causes
        } else if too_bright {
            let mut causes = vec![
                "Direct light into the lens".to_string(),
                "Exposure set too high".to_string(),
                "Strong backlight".to_string(),
                "Reflective surfaces in view".to_string(),
            ];
            if severity == Severity::Critical {
                causes.push("Sensor fault".to_string());
                causes.push("Runaway exposure control".to_string());
            }
            causes
        } else {
            Vec::new()
        };

        let suggestions = if too_dark {
            let mut suggestions = vec![
                "Check scene lighting".to_string(),
                "Adjust camera exposure".to_string(),
                "Check for obstructions".to_string(),
            ];
            if severity == Severity::Critical {
                suggestions.push("Check camera power and cabling".to_string());
                suggestions.push("Verify the lens cap is removed".to_string());
            }
            suggestions
        } else if too_bright {
            vec![
                "Re-aim the camera away from direct light".to_string(),
                "Lower the exposure".to_string(),
                "Fit a lens hood".to_string(),
                "Review BLC/WDR settings".to_string(),
            ]
        } else {
            Vec::new()
        };

        Finding {
            detector_name: METADATA.name.to_string(),
            issue_type,
            is_abnormal,
            score: mean,
            threshold,
            confidence,
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
    fn dark_frame_reports_too_dark() {
        let detector = BrightnessDetector::new(&Thresholds::default());
        let finding = detector.detect(&Frame::filled(32, 32, 8, 8, 8), DetectionLevel::Standard);
        assert!(finding.is_abnormal);
        assert_eq!(finding.issue_type, issues::TOO_DARK);
        assert!(finding.is_well_formed());
    }

    #[test]
    fn near_black_is_critical() {
        let detector = BrightnessDetector::new(&Thresholds::default());
        let finding = detector.detect(&Frame::filled(32, 32, 0, 0, 0), DetectionLevel::Standard);
        assert_eq!(finding.severity, Severity::Critical);
    }

    #[test]
    fn blown_out_frame_reports_too_bright() {
        let detector = BrightnessDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(32, 32, 255, 255, 255), DetectionLevel::Standard);
        assert_eq!(finding.issue_type, issues::TOO_BRIGHT);
        assert_eq!(finding.severity, Severity::Critical);
    }

    #[test]
    fn mid_gray_is_normal() {
        let detector = BrightnessDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(32, 32, 128, 128, 128), DetectionLevel::Standard);
        assert!(!finding.is_abnormal);
        assert_eq!(finding.severity, Severity::Normal);
    }

    #[test]
    fn deep_level_adds_histogram_evidence() {
        let detector = BrightnessDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(32, 32, 128, 128, 128), DetectionLevel::Deep);
        assert!(finding.evidence.contains_key("histogram_entropy"));
        assert!(finding.evidence.contains_key("dark_pixel_ratio"));
    }
}
