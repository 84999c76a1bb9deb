//! Contrast detection: global standard deviation and dynamic range.

use std::time::Instant;

use argus_config::Thresholds;
use argus_model::{DetectionLevel, Evidence, Finding, Frame, Severity, issues};

use crate::imageops::Gray;
use crate::imageops::filter::local_mean_std;
use crate::imageops::stats::{mean_std, min_max, percentile};

use super::{Detector, DetectorMetadata, distance_confidence, elapsed_ms};

pub static METADATA: DetectorMetadata = DetectorMetadata {
    name: "contrast",
    display_name: "Image contrast",
    description: "Detects washed-out frames with poor tonal separation",
    version: "1.0.0",
    priority: 60,
    supported_levels: &[
        DetectionLevel::Fast,
        DetectionLevel::Standard,
        DetectionLevel::Deep,
    ],
    suppresses: &[],
};

pub struct ContrastDetector {
    min: f64,
}

impl ContrastDetector {
    pub fn new(thresholds: &Thresholds) -> Self {
        ContrastDetector {
            min: thresholds.contrast_min,
        }
    }

    fn severity(&self, contrast: f64) -> Severity {
        if contrast >= self.min {
            Severity::Normal
        } else if contrast >= self.min * 0.7 {
            Severity::Info
        } else if contrast >= self.min * 0.4 {
            Severity::Warning
        } else {
            Severity::Critical
        }
    }
}

impl Detector for ContrastDetector {
    fn metadata(&self) -> &DetectorMetadata {
        &METADATA
    }

    fn detect(&self, frame: &Frame, level: DetectionLevel) -> Finding {
        let start = Instant::now();
        let gray = Gray::from_frame(frame);

        let (_, std_contrast) = mean_std(gray.data());
        let (min_val, max_val) = min_max(gray.data());
        let dynamic_range = max_val as f64 - min_val as f64;

        let is_abnormal = std_contrast < self.min;
        let severity = self.severity(std_contrast);
        let confidence = distance_confidence(std_contrast, self.min, true);

        let mut evidence = Evidence::new();
        evidence.insert("std_contrast".into(), std_contrast.into());
        evidence.insert("dynamic_range".into(), dynamic_range.into());
        evidence.insert("min_value".into(), (min_val as f64).into());
        evidence.insert("max_value".into(), (max_val as f64).into());
        evidence.insert("contrast_threshold".into(), self.min.into());

        if matches!(level, DetectionLevel::Standard | DetectionLevel::Deep) {
            let (_, local_stds) = local_mean_std(&gray, 31);
            let local_contrast =
                local_stds.iter().sum::<f64>() / local_stds.len().max(1) as f64;
            evidence.insert("local_contrast".into(), local_contrast.into());
        }

        if level == DetectionLevel::Deep {
            // std already is the RMS contrast about the mean.
            evidence.insert("rms_contrast".into(), std_contrast.into());

            let michelson = if max_val as f64 + min_val as f64 > 0.0 {
                dynamic_range / (max_val as f64 + min_val as f64)
            } else {
                0.0
            };
            evidence.insert("michelson_contrast".into(), michelson.into());

            let background = percentile(gray.data(), 50.0);
            if background > 0.0 {
                let weber = gray
                    .data()
                    .iter()
                    .map(|&v| ((v as f64 - background) / background).abs())
                    .sum::<f64>()
                    / gray.len().max(1) as f64;
                evidence.insert("weber_contrast_mean".into(), weber.into());
            }
        }

        let explanation = if is_abnormal {
            format!(
                "Contrast {std_contrast:.1} is below the threshold of {:.1} \
                 (dynamic range {dynamic_range:.1}); frame looks flat",
                self.min
            )
        } else {
            format!("Contrast {std_contrast:.1}; tonal separation is normal")
        };

        let possible_causes = if is_abnormal {
            let mut causes = vec![
                "Poor lighting conditions".to_string(),
                "Fog, haze, or dust".to_string(),
                "Camera parameters misconfigured".to_string(),
                "Dirty lens".to_string(),
            ];
            if dynamic_range < 50.0 {
                causes.push("Scene itself lacks variation, e.g. a plain wall".to_string());
            }
            if severity == Severity::Critical {
                causes.push("Aging image sensor".to_string());
            }
            causes
        } else {
            Vec::new()
        };

        let suggestions = if is_abnormal {
            let mut suggestions = vec![
                "Inspect and clean the lens".to_string(),
                "Adjust the camera's contrast setting".to_string(),
                "Improve scene lighting".to_string(),
            ];
            if matches!(severity, Severity::Warning | Severity::Critical) {
                suggestions.push("Check for fog or dust in the housing".to_string());
                suggestions.push("Enable wide dynamic range (WDR)".to_string());
            }
            suggestions
        } else {
            Vec::new()
        };

        Finding {
            detector_name: METADATA.name.to_string(),
            issue_type: if is_abnormal {
                issues::LOW_CONTRAST.to_string()
            } else {
                issues::normal_for(METADATA.name)
            },
            is_abnormal,
            score: std_contrast,
            threshold: self.min,
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
    fn uniform_frame_has_no_contrast() {
        let detector = ContrastDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(32, 32, 128, 128, 128), DetectionLevel::Standard);
        assert!(finding.is_abnormal);
        assert_eq!(finding.issue_type, issues::LOW_CONTRAST);
        assert_eq!(finding.severity, Severity::Critical);
        assert!(finding.is_well_formed());
    }

    #[test]
    fn half_black_half_white_has_high_contrast() {
        let detector = ContrastDetector::new(&Thresholds::default());
        let mut frame = Frame::filled(32, 32, 0, 0, 0);
        for y in 0..32 {
            for x in 16..32 {
                frame.set_pixel(x, y, [255, 255, 255]);
            }
        }
        let finding = detector.detect(&frame, DetectionLevel::Standard);
        assert!(!finding.is_abnormal);
    }

    #[test]
    fn deep_level_adds_contrast_variants() {
        let detector = ContrastDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(32, 32, 100, 100, 100), DetectionLevel::Deep);
        assert!(finding.evidence.contains_key("michelson_contrast"));
        assert!(finding.evidence.contains_key("rms_contrast"));
    }
}
