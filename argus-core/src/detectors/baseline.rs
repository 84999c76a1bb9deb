//! Baseline comparison: how far has the view drifted from a stored
//! reference frame?

use std::time::Instant;

use argus_model::{DetectionLevel, Evidence, EvidenceValue, Finding, Frame, Severity, issues};

use crate::error::{EngineError, Result};
use crate::imageops::Gray;
use crate::imageops::features::{Descriptor, extract_features, match_ratio};
use crate::imageops::filter::resize_frame;
use crate::imageops::motion::Point;
use crate::imageops::ssim::{grid_ssim, ssim};
use crate::imageops::stats::{hist_correlation, histogram256};

use super::{Detector, DetectorMetadata, elapsed_ms};

pub static METADATA: DetectorMetadata = DetectorMetadata {
    name: "baseline_comparison",
    display_name: "Baseline comparison",
    description: "Compares the frame against a stored reference image",
    version: "1.0.0",
    priority: 40,
    supported_levels: &[
        DetectionLevel::Fast,
        DetectionLevel::Standard,
        DetectionLevel::Deep,
    ],
    suppresses: &[],
};

/// Decision boundaries for the comparison. Similarities below a
/// threshold, or too many degraded grid cells, flag a mismatch.
#[derive(Debug, Clone)]
pub struct BaselineOptions {
    pub ssim_threshold: f64,
    pub histogram_threshold: f64,
    pub feature_match_threshold: f64,
    /// Abnormal-cell share of the grid that flags a mismatch.
    pub diff_threshold: f64,
    pub grid_size: usize,
    pub max_features: usize,
}

impl Default for BaselineOptions {
    fn default() -> Self {
        BaselineOptions {
            ssim_threshold: 0.85,
            histogram_threshold: 0.80,
            feature_match_threshold: 0.70,
            diff_threshold: 0.15,
            grid_size: 3,
            max_features: 500,
        }
    }
}

/// Distinguished detector holding a reference frame. Not part of the
/// registry: it is constructed per request by callers that resolved a
/// baseline image.
pub struct BaselineComparisonDetector {
    reference: Frame,
    reference_gray: Gray,
    reference_hist: [u64; 256],
    reference_features: Vec<(Point, Descriptor)>,
    options: BaselineOptions,
}

impl BaselineComparisonDetector {
    pub fn new(reference: Frame, options: BaselineOptions) -> Result<Self> {
        if reference.is_empty() {
            return Err(EngineError::InvalidFrame(
                "baseline reference frame is empty".to_string(),
            ));
        }
        let reference_gray = Gray::from_frame(&reference);
        let reference_hist = histogram256(reference_gray.data());
        let reference_features = extract_features(&reference_gray, options.max_features);
        Ok(BaselineComparisonDetector {
            reference,
            reference_gray,
            reference_hist,
            reference_features,
            options,
        })
    }

    fn severity(&self, diff: f64, threshold: f64) -> Severity {
        if diff <= threshold {
            return Severity::Normal;
        }
        let ratio = if threshold > 0.0 {
            diff / threshold
        } else {
            f64::INFINITY
        };
        if ratio < 1.5 {
            Severity::Info
        } else if ratio < 2.0 {
            Severity::Warning
        } else {
            Severity::Critical
        }
    }
}

impl Detector for BaselineComparisonDetector {
    fn metadata(&self) -> &DetectorMetadata {
        &METADATA
    }

    fn detect(&self, frame: &Frame, level: DetectionLevel) -> Finding {
        let start = Instant::now();
        let opts = &self.options;

        // Compare at reference dimensions.
        let resized;
        let target = if frame.width() != self.reference.width()
            || frame.height() != self.reference.height()
        {
            resized = resize_frame(frame, self.reference.width(), self.reference.height());
            &resized
        } else {
            frame
        };
        let target_gray = Gray::from_frame(target);

        let ssim_score = ssim(&self.reference_gray, &target_gray);
        let hist_similarity =
            hist_correlation(&self.reference_hist, &histogram256(target_gray.data()));
        let target_features = extract_features(&target_gray, opts.max_features);
        let feature_score = match_ratio(&self.reference_features, &target_features);

        let cells = grid_ssim(&self.reference_gray, &target_gray, opts.grid_size);
        let abnormal_cells = cells
            .iter()
            .filter(|&&s| s < opts.ssim_threshold)
            .count();
        let abnormal_cell_ratio = if cells.is_empty() {
            0.0
        } else {
            abnormal_cells as f64 / cells.len() as f64
        };

        let is_abnormal = ssim_score < opts.ssim_threshold
            || hist_similarity < opts.histogram_threshold
            || feature_score < opts.feature_match_threshold
            || abnormal_cell_ratio > opts.diff_threshold;

        let overall_similarity = (ssim_score + hist_similarity + feature_score) / 3.0;
        let diff_score = 1.0 - overall_similarity;
        let threshold = 1.0 - opts.ssim_threshold;
        let severity = if is_abnormal {
            // At least Info even when the aggregate hides a single
            // failed indicator.
            self.severity(diff_score, threshold).max(Severity::Info)
        } else {
            Severity::Normal
        };

        let mut evidence = Evidence::new();
        evidence.insert("ssim_score".into(), ssim_score.into());
        evidence.insert("histogram_similarity".into(), hist_similarity.into());
        evidence.insert("feature_match_score".into(), feature_score.into());
        evidence.insert("overall_similarity".into(), overall_similarity.into());
        evidence.insert("abnormal_cell_ratio".into(), abnormal_cell_ratio.into());
        evidence.insert(
            "grid_ssim".into(),
            EvidenceValue::Numbers(cells.clone()),
        );

        let explanation = if is_abnormal {
            let mut reasons = Vec::new();
            if ssim_score < opts.ssim_threshold {
                reasons.push(format!("low structural similarity ({ssim_score:.2})"));
            }
            if hist_similarity < opts.histogram_threshold {
                reasons.push(format!("diverged color distribution ({hist_similarity:.2})"));
            }
            if feature_score < opts.feature_match_threshold {
                reasons.push(format!("weak feature matching ({feature_score:.2})"));
            }
            if abnormal_cell_ratio > opts.diff_threshold {
                reasons.push(format!(
                    "{abnormal_cells} of {} grid cells degraded",
                    cells.len()
                ));
            }
            format!(
                "Significant difference from the baseline image: {}",
                reasons.join(", ")
            )
        } else {
            format!(
                "Close match to the baseline (SSIM {ssim_score:.2}, histogram \
                 {hist_similarity:.2}, features {feature_score:.2})"
            )
        };

        Finding {
            detector_name: METADATA.name.to_string(),
            issue_type: if is_abnormal {
                issues::BASELINE_MISMATCH.to_string()
            } else {
                issues::normal_for(METADATA.name)
            },
            is_abnormal,
            score: diff_score,
            threshold,
            confidence: overall_similarity.clamp(0.0, 1.0),
            severity,
            explanation,
            possible_causes: if is_abnormal {
                vec![
                    "Camera position has changed".to_string(),
                    "Scene content has changed".to_string(),
                    "Lighting differs from the baseline".to_string(),
                ]
            } else {
                Vec::new()
            },
            suggestions: if is_abnormal {
                vec![
                    "Verify the camera position".to_string(),
                    "Inspect the scene".to_string(),
                    "Check lighting conditions".to_string(),
                    "Update the baseline if the change is expected".to_string(),
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

    fn scene(seed: usize) -> Frame {
        let mut frame = Frame::filled(96, 96, 0, 0, 0);
        for y in 0..96u32 {
            for x in 0..96u32 {
                let b = ((x as usize * 7 + y as usize * 3 + seed * 31) % 256) as u8;
                let g = ((x as usize * 5 + y as usize * 11 + seed * 57) % 256) as u8;
                let r = ((x as usize * 13 + y as usize * 17 + seed * 91) % 256) as u8;
                frame.set_pixel(x, y, [b, g, r]);
            }
        }
        frame
    }

    #[test]
    fn identical_frame_matches() {
        let reference = scene(0);
        let detector =
            BaselineComparisonDetector::new(reference.clone(), BaselineOptions::default())
                .unwrap();
        let finding = detector.detect(&reference, DetectionLevel::Standard);
        assert!(!finding.is_abnormal, "evidence: {:?}", finding.evidence);
        assert!(finding.is_well_formed());
    }

    #[test]
    fn unrelated_frame_mismatches() {
        let detector =
            BaselineComparisonDetector::new(scene(0), BaselineOptions::default()).unwrap();
        let finding = detector.detect(&scene(5), DetectionLevel::Standard);
        assert!(finding.is_abnormal);
        assert_eq!(finding.issue_type, issues::BASELINE_MISMATCH);
        assert!(finding.severity >= Severity::Info);
    }

    #[test]
    fn differently_sized_target_is_resized() {
        let detector =
            BaselineComparisonDetector::new(scene(0), BaselineOptions::default()).unwrap();
        let small = crate::imageops::filter::resize_frame(&scene(0), 48, 48);
        // Down-and-up sampling loses detail but the comparison must not
        // reject the call outright.
        let finding = detector.detect(&small, DetectionLevel::Standard);
        assert!(finding.evidence.contains_key("ssim_score"));
    }

    #[test]
    fn empty_reference_is_rejected() {
        let empty = Frame::filled(0, 0, 0, 0, 0);
        assert!(BaselineComparisonDetector::new(empty, BaselineOptions::default()).is_err());
    }
}
