use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Every tunable decision boundary the still-frame detectors consult.
///
/// A profile that does not mention a threshold inherits the engine default
/// from [`Thresholds::default`]. Values are immutable for the duration of a
/// diagnosis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Sharpness score below this is blur.
    pub blur_threshold: f64,
    /// Mean intensity band considered healthy.
    pub brightness_min: f64,
    pub brightness_max: f64,
    /// Global standard deviation below this is low contrast.
    pub contrast_min: f64,
    /// Mean HSV saturation below this is grayscale.
    pub saturation_min: f64,
    /// Max BGR channel deviation above this is a color cast.
    pub color_cast_threshold: f64,
    /// Noise estimate above this is noisy.
    pub noise_threshold: f64,
    /// Directional frequency energy above this is a stripe pattern.
    pub stripe_threshold: f64,
    /// Mean intensity below this is a black screen.
    pub black_screen_threshold: f64,
    /// Weighted occlusion score above this is an occlusion.
    pub occlusion_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            blur_threshold: 100.0,
            brightness_min: 20.0,
            brightness_max: 235.0,
            contrast_min: 30.0,
            saturation_min: 10.0,
            color_cast_threshold: 30.0,
            noise_threshold: 15.0,
            stripe_threshold: 0.3,
            black_screen_threshold: 10.0,
            occlusion_threshold: 0.25,
        }
    }
}

impl Thresholds {
    /// Apply ad-hoc overrides from an open key/value map, rejecting keys
    /// that name no threshold.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, f64>) -> Result<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "blur_threshold" => self.blur_threshold = *value,
                "brightness_min" => self.brightness_min = *value,
                "brightness_max" => self.brightness_max = *value,
                "contrast_min" => self.contrast_min = *value,
                "saturation_min" => self.saturation_min = *value,
                "color_cast_threshold" => self.color_cast_threshold = *value,
                "noise_threshold" => self.noise_threshold = *value,
                "stripe_threshold" => self.stripe_threshold = *value,
                "black_screen_threshold" => self.black_screen_threshold = *value,
                "occlusion_threshold" => self.occlusion_threshold = *value,
                other => {
                    return Err(ConfigError::UnknownThreshold(other.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Stable hash over the exact bit patterns, used as the registry's
    /// instance-cache key.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for value in [
            self.blur_threshold,
            self.brightness_min,
            self.brightness_max,
            self.contrast_min,
            self.saturation_min,
            self.color_cast_threshold,
            self.noise_threshold,
            self.stripe_threshold,
            self.black_screen_threshold,
            self.occlusion_threshold,
        ] {
            value.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// A named threshold bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub thresholds: Thresholds,
}

/// Names of the built-in presets.
pub fn preset_names() -> &'static [&'static str] {
    &["strict", "normal", "loose"]
}

/// Look up a built-in preset by name.
pub fn preset(name: &str) -> Result<Profile> {
    let profile = match name {
        "strict" => Profile {
            name: "strict".into(),
            display_name: "Strict".into(),
            description: "High-fidelity scenes such as banking or control rooms".into(),
            thresholds: Thresholds {
                blur_threshold: 50.0,
                brightness_min: 30.0,
                brightness_max: 220.0,
                contrast_min: 40.0,
                saturation_min: 15.0,
                color_cast_threshold: 20.0,
                noise_threshold: 10.0,
                stripe_threshold: 0.2,
                black_screen_threshold: 15.0,
                occlusion_threshold: 0.2,
            },
        },
        "normal" => Profile {
            name: "normal".into(),
            display_name: "Normal".into(),
            description: "General indoor and campus surveillance".into(),
            thresholds: Thresholds {
                // Raised so texture-rich frames do not register as noisy.
                noise_threshold: 30.0,
                ..Thresholds::default()
            },
        },
        "loose" => Profile {
            name: "loose".into(),
            display_name: "Loose".into(),
            description: "Outdoor or otherwise uncontrolled environments".into(),
            thresholds: Thresholds {
                blur_threshold: 150.0,
                brightness_min: 10.0,
                brightness_max: 245.0,
                contrast_min: 20.0,
                saturation_min: 5.0,
                color_cast_threshold: 40.0,
                noise_threshold: 25.0,
                stripe_threshold: 0.4,
                black_screen_threshold: 5.0,
                occlusion_threshold: 0.4,
            },
        },
        other => return Err(ConfigError::UnknownProfile(other.to_string())),
    };
    Ok(profile)
}
