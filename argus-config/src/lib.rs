//! Profiles, detection thresholds, and application settings.

pub mod profiles;
pub mod settings;

pub use profiles::{Profile, Thresholds, preset, preset_names};
pub use settings::{AppConfig, ServerConfig, StorageConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Unknown threshold key: {0}")]
    UnknownThreshold(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
