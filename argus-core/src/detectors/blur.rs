//! Blur detection: low edge energy and collapsed second derivatives.

use std::time::Instant;

use argus_config::Thresholds;
use argus_model::{DetectionLevel, Evidence, Finding, Frame, Severity, issues};

use crate::imageops::filter::resize_gray;
use crate::imageops::gradients::{
    self, EDGE_THRESHOLD, brenner, laplacian_variance, sobel_magnitude_mean, tenengrad,
};
use crate::imageops::Gray;

use super::{Detector, DetectorMetadata, distance_confidence, elapsed_ms};

pub static METADATA: DetectorMetadata = DetectorMetadata {
    name: "blur",
    display_name: "Image blur",
    description: "Detects defocus and motion blur from edge and gradient energy",
    version: "1.0.0",
    priority: 50,
    supported_levels: &[
        DetectionLevel::Fast,
        DetectionLevel::Standard,
        DetectionLevel::Deep,
    ],
    suppresses: &[],
};

pub struct BlurDetector {
    threshold: f64,
}

impl BlurDetector {
    pub fn new(thresholds: &Thresholds) -> Self {
        BlurDetector {
            threshold: thresholds.blur_threshold,
        }
    }

    fn fast(&self, gray: &Gray) -> (f64, Evidence) {
        let lap_var = laplacian_variance(gray);
        let mut evidence = Evidence::new();
        evidence.insert("laplacian_variance".into(), lap_var.into());
        evidence.insert("method".into(), "fast".into());
        (lap_var, evidence)
    }

    fn standard(&self, gray: &Gray) -> (f64, Evidence) {
        let lap_var = laplacian_variance(gray);
        let gradient_mean = sobel_magnitude_mean(gray);
        let score = lap_var * 0.6 + gradient_mean * 0.4;

        let mut evidence = Evidence::new();
        evidence.insert("laplacian_variance".into(), lap_var.into());
        evidence.insert("gradient_mean".into(), gradient_mean.into());
        evidence.insert("combined_score".into(), score.into());
        evidence.insert("method".into(), "standard".into());
        (score, evidence)
    }

    fn deep(&self, gray: &Gray) -> (f64, Evidence) {
        let mut evidence = Evidence::new();

        let mut scale_scores = Vec::with_capacity(3);
        for scale in [1.0f64, 0.5, 0.25] {
            let scaled = if scale == 1.0 {
                gray.clone()
            } else {
                resize_gray(
                    gray,
                    ((gray.width() as f64 * scale) as usize).max(3),
                    ((gray.height() as f64 * scale) as usize).max(3),
                )
            };
            let lap_var = laplacian_variance(&scaled);
            evidence.insert(format!("laplacian_scale_{scale}"), lap_var.into());
            scale_scores.push(lap_var);
        }
        let multiscale = scale_scores.iter().sum::<f64>() / scale_scores.len() as f64;

        let edge_density = gradients::edge_density(gray, EDGE_THRESHOLD);
        evidence.insert("edge_density".into(), edge_density.into());

        let brenner_score = brenner(gray);
        evidence.insert("brenner_gradient".into(), brenner_score.into());

        let tenengrad_score = tenengrad(gray);
        evidence.insert("tenengrad".into(), tenengrad_score.into());

        let score = multiscale * 0.4
            + brenner_score * 0.2
            + tenengrad_score * 0.2
            + edge_density * 1000.0 * 0.2;
        evidence.insert("final_score".into(), score.into());
        evidence.insert("method".into(), "deep".into());
        (score, evidence)
    }

    fn severity(&self, score: f64) -> Severity {
        if score >= self.threshold {
            Severity::Normal
        } else if score >= self.threshold * 0.7 {
            Severity::Info
        } else if score >= self.threshold * 0.4 {
            Severity::Warning
        } else {
            Severity::Critical
        }
    }

    fn explanation(&self, score: f64, severity: Severity) -> String {
        if severity == Severity::Normal {
            return format!("Sharpness score {score:.1}; frame is in focus");
        }
        let grade = match severity {
            Severity::Info => "slight",
            Severity::Warning => "moderate",
            _ => "severe",
        };
        format!(
            "Sharpness score {score:.1} is below the threshold of {:.1}; {grade} blur",
            self.threshold
        )
    }

    fn causes(&self, severity: Severity, edge_density: Option<f64>) -> Vec<String> {
        let mut causes = vec![
            "Dirt or moisture on the lens".to_string(),
            "Camera focus is off".to_string(),
        ];
        if let Some(density) = edge_density
            && density < 0.05
        {
            causes.push("Large smooth area or partial obstruction in view".to_string());
        }
        if severity == Severity::Critical {
            causes.push("Lens may be damaged".to_string());
            causes.push("Motion blur from camera movement".to_string());
            causes.push("Severe defocus".to_string());
        }
        causes
    }

    fn suggestions(&self, severity: Severity) -> Vec<String> {
        let mut suggestions = vec!["Inspect and clean the camera lens".to_string()];
        if matches!(severity, Severity::Warning | Severity::Critical) {
            suggestions.push("Re-adjust the focus".to_string());
            suggestions.push("Check that the camera mount is stable".to_string());
            suggestions.push("Consider replacing the camera".to_string());
        }
        suggestions
    }
}

impl Detector for BlurDetector {
    fn metadata(&self) -> &DetectorMetadata {
        &METADATA
    }

    fn detect(&self, frame: &Frame, level: DetectionLevel) -> Finding {
        let start = Instant::now();
        let gray = Gray::from_frame(frame);

        let (score, evidence) = match level {
            DetectionLevel::Fast => self.fast(&gray),
            DetectionLevel::Standard => self.standard(&gray),
            DetectionLevel::Deep => self.deep(&gray),
        };

        let is_abnormal = score < self.threshold;
        let severity = self.severity(score);
        let confidence = distance_confidence(score, self.threshold, true);
        let edge_density = evidence.get("edge_density").and_then(|v| v.as_number());

        Finding {
            detector_name: METADATA.name.to_string(),
            issue_type: if is_abnormal {
                issues::BLUR.to_string()
            } else {
                issues::normal_for(METADATA.name)
            },
            is_abnormal,
            score,
            threshold: self.threshold,
            confidence,
            severity,
            explanation: self.explanation(score, severity),
            possible_causes: if is_abnormal {
                self.causes(severity, edge_density)
            } else {
                Vec::new()
            },
            suggestions: if is_abnormal {
                self.suggestions(severity)
            } else {
                Vec::new()
            },
            evidence,
            process_time_ms: elapsed_ms(start),
            detection_level: level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sharp_frame() -> Frame {
        // High-frequency checkerboard.
        let mut frame = Frame::filled(64, 64, 0, 0, 0);
        for y in 0..64 {
            for x in 0..64 {
                if (x + y) % 2 == 0 {
                    frame.set_pixel(x, y, [255, 255, 255]);
                }
            }
        }
        frame
    }

    #[test]
    fn flat_frame_is_blurry_at_every_level() {
        let detector = BlurDetector::new(&Thresholds::default());
        let flat = Frame::filled(64, 64, 90, 90, 90);
        for level in [
            DetectionLevel::Fast,
            DetectionLevel::Standard,
            DetectionLevel::Deep,
        ] {
            let finding = detector.detect(&flat, level);
            assert!(finding.is_abnormal, "level {level}");
            assert_eq!(finding.issue_type, issues::BLUR);
            assert_eq!(finding.severity, Severity::Critical);
            assert!(finding.is_well_formed());
        }
    }

    #[test]
    fn checkerboard_is_sharp() {
        let detector = BlurDetector::new(&Thresholds::default());
        let finding = detector.detect(&sharp_frame(), DetectionLevel::Standard);
        assert!(!finding.is_abnormal);
        assert_eq!(finding.issue_type, "blur_normal");
        assert_eq!(finding.severity, Severity::Normal);
    }

    #[test]
    fn deep_level_records_extra_evidence() {
        let detector = BlurDetector::new(&Thresholds::default());
        let finding = detector.detect(&sharp_frame(), DetectionLevel::Deep);
        assert!(finding.evidence.contains_key("brenner_gradient"));
        assert!(finding.evidence.contains_key("tenengrad"));
        assert!(finding.evidence.contains_key("edge_density"));
    }
}
