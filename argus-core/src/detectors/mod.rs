//! Analytic detectors and their registry.
//!
//! Every still-frame detector is a pure, reentrant function from a frame
//! and a depth level to a [`Finding`]; video detectors map a sampled frame
//! sequence to a [`VideoDetectionResult`]. Detectors carry a fixed
//! priority (smaller wins conflicts) and may declare issue types they
//! suppress in lower-priority findings.

pub mod baseline;
pub mod blur;
pub mod brightness;
pub mod color;
pub mod contrast;
pub mod noise;
pub mod occlusion;
pub mod registry;
pub mod signal_loss;
pub mod stripe;
pub mod video;

use std::time::Instant;

use argus_model::{DetectionLevel, Finding, Frame, VideoDetectionResult};

/// Static facts about a detector, used by the registry and the pipeline's
/// priority ordering.
#[derive(Debug, Clone, Copy)]
pub struct DetectorMetadata {
    /// Stable registry key.
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    /// Conflict priority; smaller numbers win.
    pub priority: u32,
    pub supported_levels: &'static [DetectionLevel],
    /// Issue types this detector hides in lower-priority findings.
    pub suppresses: &'static [&'static str],
}

impl DetectorMetadata {
    pub fn supports(&self, level: DetectionLevel) -> bool {
        self.supported_levels.contains(&level)
    }
}

/// A still-frame detector.
///
/// Implementations must be pure and reentrant: concurrent calls on
/// disjoint frames never interfere, and no state is retained between
/// calls.
pub trait Detector: Send + Sync {
    fn metadata(&self) -> &DetectorMetadata;

    /// Analyze one BGR frame at the given depth. The frame is non-empty
    /// and at least 2x2; the pipeline screens smaller inputs out.
    fn detect(&self, frame: &Frame, level: DetectionLevel) -> Finding;
}

/// A detector scoped to a sampled frame sequence.
pub trait VideoDetector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Analyze the sampled frames. `timestamps` is parallel to `frames`;
    /// when empty, timestamps are derived from `fps`.
    fn detect(&self, frames: &[Frame], fps: f64, timestamps: &[f64]) -> VideoDetectionResult;
}

/// Confidence from the distance between score and threshold, the common
/// rule shared by most detectors.
pub(crate) fn distance_confidence(score: f64, threshold: f64, higher_is_better: bool) -> f64 {
    if threshold == 0.0 {
        return 1.0;
    }
    let ratio = if higher_is_better {
        (score - threshold).abs() / threshold
    } else {
        (score - threshold).abs() / threshold.max(1.0)
    };
    ratio.min(1.0)
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(distance_confidence(0.0, 100.0, true), 1.0);
        assert!(distance_confidence(90.0, 100.0, true) < 0.2);
        assert_eq!(distance_confidence(5.0, 0.0, false), 1.0);
    }
}
