use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use argus_model::DetectionLevel;

use crate::profiles::{Thresholds, preset};
use crate::Result;

/// Environment variable consulted when no config path is given.
pub const CONFIG_ENV: &str = "ARGUS_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root for baselines and the scheduler's task store.
    pub data_dir: PathBuf,
    /// Default directory for job reports.
    pub report_dir: PathBuf,
    pub keep_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            data_dir: PathBuf::from("./data"),
            report_dir: PathBuf::from("./reports"),
            keep_days: 30,
        }
    }
}

/// Application-level settings, loadable from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Active profile name.
    pub profile: String,
    pub detection_level: DetectionLevel,
    pub parallel_detection: bool,
    pub max_workers: usize,
    /// Per-key overrides applied on top of the profile.
    pub custom_thresholds: Option<BTreeMap<String, f64>>,

    pub server: ServerConfig,
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            profile: "normal".to_string(),
            detection_level: DetectionLevel::Standard,
            parallel_detection: true,
            max_workers: 4,
            custom_thresholds: None,
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the given path, from `$ARGUS_CONFIG`, or fall back to
    /// defaults when neither names an existing file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        match candidate {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(&path)?;
                Ok(serde_yaml::from_str(&text)?)
            }
            _ => Ok(AppConfig::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Resolve the effective thresholds: profile preset plus custom
    /// overrides. Unknown profile names and unknown override keys are
    /// rejected.
    pub fn thresholds(&self) -> Result<Thresholds> {
        let mut thresholds = preset(&self.profile)?.thresholds;
        if let Some(overrides) = &self.custom_thresholds {
            thresholds.apply_overrides(overrides)?;
        }
        Ok(thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.profile, "normal");
        assert!(config.parallel_detection);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("argus.yaml");

        let mut config = AppConfig::default();
        config.profile = "strict".to_string();
        config.server.port = 9090;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.profile, "strict");
        assert_eq!(loaded.server.port, 9090);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loaded =
            AppConfig::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap();
        assert_eq!(loaded.profile, "normal");
    }

    #[test]
    fn thresholds_resolve_profile_plus_overrides() {
        let mut config = AppConfig::default();
        let mut overrides = BTreeMap::new();
        overrides.insert("blur_threshold".to_string(), 80.0);
        config.custom_thresholds = Some(overrides);

        let thresholds = config.thresholds().unwrap();
        assert_eq!(thresholds.blur_threshold, 80.0);
        // Profile value survives where no override is given.
        assert_eq!(thresholds.noise_threshold, 30.0);
    }
}
