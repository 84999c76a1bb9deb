//! Detectors scoped to sampled frame sequences.

pub mod freeze;
pub mod scene_change;
pub mod shake;

pub use freeze::{FreezeDetector, FreezeOptions, SimilarityMethod};
pub use scene_change::{SceneChangeDetector, SceneChangeOptions};
pub use shake::{ShakeDetector, ShakeOptions};

use argus_model::VideoSeverity;

/// Per-frame timestamps, derived from the frame rate when the sampler
/// did not provide them.
pub(crate) fn resolve_timestamps(count: usize, fps: f64, timestamps: &[f64]) -> Vec<f64> {
    if timestamps.len() == count {
        return timestamps.to_vec();
    }
    let fps = if fps > 0.0 { fps } else { 25.0 };
    (0..count).map(|i| i as f64 / fps).collect()
}

/// Severity ladder shared by the video detectors: proportional overshoot
/// of the threshold.
pub(crate) fn ratio_severity(score: f64, threshold: f64) -> VideoSeverity {
    if score <= threshold {
        return VideoSeverity::Normal;
    }
    let ratio = if threshold > 0.0 {
        score / threshold
    } else {
        f64::INFINITY
    };
    if ratio < 1.5 {
        VideoSeverity::Info
    } else if ratio < 2.0 {
        VideoSeverity::Warning
    } else {
        VideoSeverity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_fall_back_to_fps() {
        let ts = resolve_timestamps(3, 30.0, &[]);
        assert_eq!(ts.len(), 3);
        assert!((ts[2] - 2.0 / 30.0).abs() < 1e-9);

        let given = [0.5, 0.7, 0.9];
        assert_eq!(resolve_timestamps(3, 30.0, &given), given);
    }

    #[test]
    fn severity_ladder() {
        assert_eq!(ratio_severity(1.0, 2.0), VideoSeverity::Normal);
        assert_eq!(ratio_severity(2.5, 2.0), VideoSeverity::Info);
        assert_eq!(ratio_severity(3.5, 2.0), VideoSeverity::Warning);
        assert_eq!(ratio_severity(5.0, 2.0), VideoSeverity::Error);
    }
}
