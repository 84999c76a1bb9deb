//! The closed set of issue-type identifiers detectors may report.
//!
//! Issue types travel as open strings so the wire format stays
//! forward-compatible, but everything the built-in detectors emit comes
//! from this module.

pub const BLUR: &str = "blur";
pub const PARTIAL_BLUR: &str = "partial_blur";
pub const TOO_DARK: &str = "too_dark";
pub const TOO_BRIGHT: &str = "too_bright";
pub const LOW_CONTRAST: &str = "low_contrast";
pub const LOW_SATURATION: &str = "low_saturation";
pub const NO_TEXTURE: &str = "no_texture";
pub const COLOR_CAST: &str = "color_cast";
pub const GRAYSCALE: &str = "grayscale";
pub const BLUE_SCREEN: &str = "blue_screen";
pub const GREEN_SCREEN: &str = "green_screen";
pub const NOISE: &str = "noise";
pub const GAUSSIAN_NOISE: &str = "gaussian_noise";
pub const SALT_PEPPER_NOISE: &str = "salt_pepper_noise";
pub const SNOW_NOISE: &str = "snow_noise";
pub const STRIPE: &str = "stripe";
pub const OCCLUSION: &str = "occlusion";
pub const SIGNAL_LOSS: &str = "signal_loss";
pub const BLACK_SCREEN: &str = "black_screen";
pub const WHITE_SCREEN: &str = "white_screen";
pub const SOLID_COLOR: &str = "solid_color";
pub const BASELINE_MISMATCH: &str = "baseline_mismatch";
pub const FREEZE: &str = "freeze";
pub const SCENE_CHANGE: &str = "scene_change";
pub const SHAKE: &str = "shake";
pub const ERROR: &str = "error";
pub const NO_FRAMES: &str = "no_frames";

/// Suffix carried by the "no problem found" sentinel issue types.
pub const NORMAL_SUFFIX: &str = "_normal";

/// Sentinel issue type a detector reports when it found nothing wrong.
pub fn normal_for(detector_name: &str) -> String {
    format!("{detector_name}{NORMAL_SUFFIX}")
}

/// Whether an issue type is a "no problem" sentinel.
pub fn is_normal(issue_type: &str) -> bool {
    issue_type.ends_with(NORMAL_SUFFIX) || issue_type == "normal"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_round_trip() {
        assert_eq!(normal_for("blur"), "blur_normal");
        assert!(is_normal("blur_normal"));
        assert!(is_normal("normal"));
        assert!(!is_normal(BLUR));
    }
}
