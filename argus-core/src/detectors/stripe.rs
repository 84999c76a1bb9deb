//! Stripe interference detection via directional spectrum energy.

use std::time::Instant;

use argus_config::Thresholds;
use argus_model::{DetectionLevel, Evidence, Finding, Frame, Severity, issues};

use crate::imageops::Gray;
use crate::imageops::frequency::{
    autocorr_first_peak, col_profile, row_profile, stripe_energies,
};

use super::{Detector, DetectorMetadata, elapsed_ms};

pub static METADATA: DetectorMetadata = DetectorMetadata {
    name: "stripe",
    display_name: "Stripe interference",
    description: "Detects periodic horizontal and vertical stripe interference",
    version: "1.0.0",
    priority: 65,
    supported_levels: &[
        DetectionLevel::Fast,
        DetectionLevel::Standard,
        DetectionLevel::Deep,
    ],
    suppresses: &[],
};

pub struct StripeDetector {
    threshold: f64,
}

impl StripeDetector {
    pub fn new(thresholds: &Thresholds) -> Self {
        StripeDetector {
            threshold: thresholds.stripe_threshold,
        }
    }

    fn severity(&self, strength: f64) -> Severity {
        if strength <= self.threshold {
            Severity::Normal
        } else if strength <= self.threshold * 1.5 {
            Severity::Info
        } else if strength <= self.threshold * 2.5 {
            Severity::Warning
        } else {
            Severity::Critical
        }
    }
}

impl Detector for StripeDetector {
    fn metadata(&self) -> &DetectorMetadata {
        &METADATA
    }

    fn detect(&self, frame: &Frame, level: DetectionLevel) -> Finding {
        let start = Instant::now();
        let gray = Gray::from_frame(frame);

        let energies = stripe_energies(&gray);
        let strength = energies.horizontal.max(energies.vertical);

        let direction = if energies.horizontal > energies.vertical * 1.5 {
            "horizontal"
        } else if energies.vertical > energies.horizontal * 1.5 {
            "vertical"
        } else if strength > self.threshold {
            "both"
        } else {
            "none"
        };

        let is_abnormal = strength > self.threshold;
        let confidence = if is_abnormal {
            ((strength - self.threshold) / self.threshold).min(1.0)
        } else {
            ((self.threshold - strength) / self.threshold).min(1.0)
        };
        let severity = self.severity(strength);

        let mut evidence = Evidence::new();
        evidence.insert(
            "horizontal_stripe_energy".into(),
            energies.horizontal.into(),
        );
        evidence.insert("vertical_stripe_energy".into(), energies.vertical.into());
        evidence.insert("stripe_strength".into(), strength.into());
        evidence.insert("stripe_direction".into(), direction.into());
        evidence.insert("stripe_threshold".into(), self.threshold.into());

        if level == DetectionLevel::Deep {
            let period = match direction {
                "horizontal" => autocorr_first_peak(&row_profile(&gray)),
                "vertical" => autocorr_first_peak(&col_profile(&gray)),
                _ => 0.0,
            };
            evidence.insert("estimated_period_pixels".into(), period.into());
        }

        let explanation = if is_abnormal {
            let described = match direction {
                "horizontal" => "horizontal",
                "vertical" => "vertical",
                _ => "horizontal and vertical",
            };
            format!("Detected {described} stripe interference, strength {strength:.3}")
        } else {
            "No significant stripe interference".to_string()
        };

        Finding {
            detector_name: METADATA.name.to_string(),
            issue_type: if is_abnormal {
                issues::STRIPE.to_string()
            } else {
                issues::normal_for(METADATA.name)
            },
            is_abnormal,
            score: strength,
            threshold: self.threshold,
            confidence: confidence.max(0.0),
            severity,
            explanation,
            possible_causes: if is_abnormal {
                vec![
                    "Power interference (50/60 Hz)".to_string(),
                    "Sensor fault".to_string(),
                    "Video signal interference".to_string(),
                    "Encoder problem".to_string(),
                    "Poor grounding".to_string(),
                ]
            } else {
                Vec::new()
            },
            suggestions: if is_abnormal {
                vec![
                    "Check power stability".to_string(),
                    "Check video cable shielding".to_string(),
                    "Check grounding".to_string(),
                    "Try another camera".to_string(),
                    "Adjust exposure settings".to_string(),
                ]
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

    fn striped_frame(period: u32, horizontal: bool) -> Frame {
        let mut frame = Frame::filled(64, 64, 0, 0, 0);
        for y in 0..64 {
            for x in 0..64 {
                let band = if horizontal { y } else { x };
                let v = if (band / period) % 2 == 0 { 220 } else { 30 };
                frame.set_pixel(x, y, [v, v, v]);
            }
        }
        frame
    }

    #[test]
    fn horizontal_bars_are_flagged_with_direction() {
        let detector = StripeDetector::new(&Thresholds::default());
        let finding = detector.detect(&striped_frame(4, true), DetectionLevel::Standard);
        assert!(finding.is_abnormal, "strength = {}", finding.score);
        assert_eq!(finding.issue_type, issues::STRIPE);
        assert_eq!(
            finding.evidence["stripe_direction"].as_text(),
            Some("horizontal")
        );
        assert!(finding.is_well_formed());
    }

    #[test]
    fn flat_frame_is_clean() {
        let detector = StripeDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(64, 64, 128, 128, 128), DetectionLevel::Standard);
        assert!(!finding.is_abnormal);
    }

    #[test]
    fn deep_level_estimates_the_period() {
        let detector = StripeDetector::new(&Thresholds::default());
        let finding = detector.detect(&striped_frame(4, true), DetectionLevel::Deep);
        let period = finding.evidence["estimated_period_pixels"]
            .as_number()
            .unwrap();
        assert!((period - 8.0).abs() <= 2.0, "period = {period}");
    }
}
