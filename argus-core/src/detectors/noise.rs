//! Noise estimation: Laplacian MAD, median residuals, and at depth,
//! impulse and snow-speckle classification.

use std::time::Instant;

use argus_config::Thresholds;
use argus_model::{DetectionLevel, Evidence, Finding, Frame, Severity, issues};

use crate::imageops::Gray;
use crate::imageops::color::hsv_planes;
use crate::imageops::filter::{local_mean_std, median_filter};
use crate::imageops::frequency::{col_profile, dft_magnitude, row_profile};
use crate::imageops::gradients::laplacian_mad_sigma;

use super::{Detector, DetectorMetadata, elapsed_ms};

pub static METADATA: DetectorMetadata = DetectorMetadata {
    name: "noise",
    display_name: "Image noise",
    description: "Estimates sensor noise and classifies gaussian, impulse, and snow noise",
    version: "1.0.0",
    priority: 55,
    supported_levels: &[
        DetectionLevel::Fast,
        DetectionLevel::Standard,
        DetectionLevel::Deep,
    ],
    suppresses: &[],
};

pub struct NoiseDetector {
    threshold: f64,
}

impl NoiseDetector {
    pub fn new(thresholds: &Thresholds) -> Self {
        NoiseDetector {
            threshold: thresholds.noise_threshold,
        }
    }

    /// High local texture inflates second-derivative noise estimates;
    /// scale the estimate down as mean local structure rises.
    fn texture_factor(gray: &Gray) -> f64 {
        let (_, stds) = local_mean_std(gray, 7);
        let mean_local_std = stds.iter().sum::<f64>() / stds.len().max(1) as f64;
        // Fully trusted below 10, halved by 40.
        (1.0 - ((mean_local_std - 10.0) / 60.0).clamp(0.0, 0.5)).max(0.5)
    }

    fn fast(&self, gray: &Gray) -> (f64, Evidence) {
        let sigma = laplacian_mad_sigma(gray);
        let factor = Self::texture_factor(gray);
        let level = sigma * factor;

        let mut evidence = Evidence::new();
        evidence.insert("estimation_method".into(), "laplacian_mad".into());
        evidence.insert("noise_sigma".into(), sigma.into());
        evidence.insert("texture_factor".into(), factor.into());
        (level, evidence)
    }

    fn standard(&self, gray: &Gray) -> (f64, Evidence) {
        let filtered = median_filter(gray, 2);
        let mut residual_sq = 0.0;
        let mut residual_sum = 0.0;
        for (&a, &b) in gray.data().iter().zip(filtered.data().iter()) {
            let d = a as f64 - b as f64;
            residual_sum += d;
            residual_sq += d * d;
        }
        let n = gray.len().max(1) as f64;
        let residual_mean = residual_sum / n;
        let noise_std = (residual_sq / n - residual_mean * residual_mean)
            .max(0.0)
            .sqrt();

        let noise_mad = laplacian_mad_sigma(gray);
        let factor = Self::texture_factor(gray);
        let level = (noise_std + noise_mad) / 2.0 * factor;

        let mut evidence = Evidence::new();
        evidence.insert("estimation_method".into(), "combined".into());
        evidence.insert("noise_std_residual".into(), noise_std.into());
        evidence.insert("noise_mad_laplacian".into(), noise_mad.into());
        evidence.insert("texture_factor".into(), factor.into());
        evidence.insert("combined_estimate".into(), level.into());
        (level, evidence)
    }

    fn deep(&self, frame: &Frame, gray: &Gray) -> (f64, Evidence) {
        let (mut level, mut evidence) = self.standard(gray);
        evidence.insert("estimation_method".into(), "deep".into());

        // High-frequency share of the profile spectra.
        let hf_ratio = {
            let spectra = [
                dft_magnitude(&row_profile(gray)),
                dft_magnitude(&col_profile(gray)),
            ];
            let mut high = 0.0;
            let mut total = 0.0;
            for magnitudes in &spectra {
                let n = magnitudes.len();
                for (k, &m) in magnitudes.iter().enumerate().take(n / 2) {
                    total += m;
                    if k >= n / 8 {
                        high += m;
                    }
                }
            }
            if total > 0.0 { high / total } else { 0.0 }
        };
        evidence.insert("high_freq_ratio".into(), hf_ratio.into());

        // Impulse noise: extreme-value pixel share.
        let salt = gray.data().iter().filter(|&&v| v > 250).count();
        let pepper = gray.data().iter().filter(|&&v| v < 5).count();
        let salt_pepper_ratio = (salt + pepper) as f64 / gray.len().max(1) as f64;
        evidence.insert("salt_pepper_ratio".into(), salt_pepper_ratio.into());

        // Snow: bright low-saturation speckle.
        let hsv = hsv_planes(frame);
        let snow = hsv
            .v
            .iter()
            .zip(hsv.s.iter())
            .filter(|&(&v, &s)| v > 240 && s < 30)
            .count();
        let snow_ratio = snow as f64 / gray.len().max(1) as f64;
        evidence.insert("snow_noise_ratio".into(), snow_ratio.into());

        if salt_pepper_ratio > 0.01 {
            level = level.max(salt_pepper_ratio * 1000.0);
        }
        if snow_ratio > 0.01 {
            level = level.max(snow_ratio * 1000.0);
        }
        evidence.insert("combined_estimate".into(), level.into());
        (level, evidence)
    }

    fn classify(&self, evidence: &Evidence) -> &'static str {
        let salt_pepper = evidence
            .get("salt_pepper_ratio")
            .and_then(|v| v.as_number())
            .unwrap_or(0.0);
        let snow = evidence
            .get("snow_noise_ratio")
            .and_then(|v| v.as_number())
            .unwrap_or(0.0);
        if snow > 0.02 {
            issues::SNOW_NOISE
        } else if salt_pepper > 0.01 {
            issues::SALT_PEPPER_NOISE
        } else {
            issues::GAUSSIAN_NOISE
        }
    }

    fn severity(&self, level: f64) -> Severity {
        if level <= self.threshold {
            Severity::Normal
        } else if level <= self.threshold * 1.5 {
            Severity::Info
        } else if level <= self.threshold * 2.5 {
            Severity::Warning
        } else {
            Severity::Critical
        }
    }
}

impl Detector for NoiseDetector {
    fn metadata(&self) -> &DetectorMetadata {
        &METADATA
    }

    fn detect(&self, frame: &Frame, level: DetectionLevel) -> Finding {
        let start = Instant::now();
        let gray = Gray::from_frame(frame);

        let (noise_level, mut evidence) = match level {
            DetectionLevel::Fast => self.fast(&gray),
            DetectionLevel::Standard => self.standard(&gray),
            DetectionLevel::Deep => self.deep(frame, &gray),
        };
        evidence.insert("noise_threshold".into(), self.threshold.into());

        let is_abnormal = noise_level > self.threshold;
        let confidence = if is_abnormal {
            ((noise_level - self.threshold) / self.threshold).min(1.0)
        } else {
            ((self.threshold - noise_level) / self.threshold).min(1.0)
        };
        let severity = self.severity(noise_level);
        let issue_type = if is_abnormal {
            self.classify(&evidence).to_string()
        } else {
            issues::normal_for(METADATA.name)
        };

        let explanation = if is_abnormal {
            let kind = match issue_type.as_str() {
                issues::SALT_PEPPER_NOISE => "salt-and-pepper noise",
                issues::SNOW_NOISE => "snow noise",
                _ => "gaussian noise",
            };
            format!(
                "Detected {kind}: level {noise_level:.1} exceeds the threshold of {:.1}",
                self.threshold
            )
        } else {
            format!("Noise level {noise_level:.1} is within the normal range")
        };

        let possible_causes = if is_abnormal {
            let mut causes = vec![
                "Low ambient light".to_string(),
                "Camera gain set too high".to_string(),
            ];
            match issue_type.as_str() {
                issues::SALT_PEPPER_NOISE => {
                    causes.push("Aging or damaged sensor".to_string());
                    causes.push("Analog-to-digital converter fault".to_string());
                    causes.push("Transmission interference".to_string());
                }
                issues::SNOW_NOISE => {
                    causes.push("Weak or missing signal".to_string());
                    causes.push("Analog signal interference".to_string());
                    causes.push("Poor cable connection".to_string());
                }
                _ => {
                    causes.push("High ISO/gain setting".to_string());
                    causes.push("Sensor thermal noise".to_string());
                    causes.push("Severely insufficient light".to_string());
                }
            }
            causes
        } else {
            Vec::new()
        };

        let suggestions = if is_abnormal {
            let mut suggestions = vec![
                "Improve scene lighting".to_string(),
                "Lower the camera gain".to_string(),
            ];
            match issue_type.as_str() {
                issues::SALT_PEPPER_NOISE => {
                    suggestions.push("Check the sensor".to_string());
                    suggestions.push("Check signal cabling".to_string());
                }
                issues::SNOW_NOISE => {
                    suggestions.push("Check signal cabling".to_string());
                    suggestions.push("Check the video source device".to_string());
                    suggestions.push("Replace the signal cable".to_string());
                }
                _ => {
                    suggestions.push("Enable noise reduction".to_string());
                    suggestions.push("Consider a lower-noise camera".to_string());
                }
            }
            suggestions
        } else {
            Vec::new()
        };

        Finding {
            detector_name: METADATA.name.to_string(),
            issue_type,
            is_abnormal,
            score: noise_level,
            threshold: self.threshold,
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

    fn noisy_frame(seed: u64) -> Frame {
        // Deterministic pseudo-noise over a flat field.
        let mut state = seed;
        let mut frame = Frame::filled(64, 64, 128, 128, 128);
        for y in 0..64 {
            for x in 0..64 {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let jitter = ((state >> 33) % 160) as i32 - 80;
                let v = (128 + jitter).clamp(0, 255) as u8;
                frame.set_pixel(x, y, [v, v, v]);
            }
        }
        frame
    }

    #[test]
    fn flat_frame_is_quiet() {
        let detector = NoiseDetector::new(&Thresholds::default());
        let finding =
            detector.detect(&Frame::filled(64, 64, 128, 128, 128), DetectionLevel::Standard);
        assert!(!finding.is_abnormal);
        assert_eq!(finding.severity, Severity::Normal);
        assert!(finding.is_well_formed());
    }

    #[test]
    fn heavy_speckle_is_noisy() {
        let detector = NoiseDetector::new(&Thresholds::default());
        let finding = detector.detect(&noisy_frame(7), DetectionLevel::Standard);
        assert!(finding.is_abnormal, "score = {}", finding.score);
        assert_eq!(finding.issue_type, issues::GAUSSIAN_NOISE);
    }

    #[test]
    fn deep_level_flags_salt_pepper() {
        let detector = NoiseDetector::new(&Thresholds::default());
        let mut frame = Frame::filled(64, 64, 128, 128, 128);
        // 2% extreme-value impulses.
        let mut state = 3u64;
        for _ in 0..82 {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let x = ((state >> 20) % 64) as u32;
            let y = ((state >> 40) % 64) as u32;
            let v = if state % 2 == 0 { 255 } else { 0 };
            frame.set_pixel(x, y, [v, v, v]);
        }
        let finding = detector.detect(&frame, DetectionLevel::Deep);
        assert!(finding.is_abnormal);
        assert_eq!(finding.issue_type, issues::SALT_PEPPER_NOISE);
    }

    #[test]
    fn deep_level_flags_snow_on_colored_background() {
        let detector = NoiseDetector::new(&Thresholds::default());
        // Saturated dark blue background with bright desaturated specks.
        let mut frame = Frame::filled(64, 64, 120, 40, 10);
        let mut state = 11u64;
        for _ in 0..120 {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let x = ((state >> 20) % 64) as u32;
            let y = ((state >> 40) % 64) as u32;
            frame.set_pixel(x, y, [250, 250, 250]);
        }
        let finding = detector.detect(&frame, DetectionLevel::Deep);
        assert!(finding.is_abnormal);
        assert_eq!(finding.issue_type, issues::SNOW_NOISE);
    }
}
