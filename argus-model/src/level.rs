use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Detection depth tier. Deeper levels trade latency for thoroughness.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum DetectionLevel {
    Fast,
    #[default]
    Standard,
    Deep,
}

impl DetectionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionLevel::Fast => "fast",
            DetectionLevel::Standard => "standard",
            DetectionLevel::Deep => "deep",
        }
    }
}

impl fmt::Display for DetectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionLevel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(DetectionLevel::Fast),
            "standard" => Ok(DetectionLevel::Standard),
            "deep" => Ok(DetectionLevel::Deep),
            other => Err(ModelError::UnknownLevel(other.to_string())),
        }
    }
}
