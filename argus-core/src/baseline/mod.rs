//! Baseline image store: one JPEG per baseline plus a JSON metadata
//! index. From the caller's perspective a record either exists with its
//! file or not at all.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use argus_model::Frame;

use crate::error::{EngineError, Result};
use crate::imageio::{load_frame, save_frame_jpeg};

/// Stored facts about one baseline image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub baseline_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub image_path: PathBuf,
    /// (width, height).
    pub image_size: (u32, u32),
    pub created_at: DateTime<Utc>,
}

pub struct BaselineStore {
    base_dir: PathBuf,
    metadata_path: PathBuf,
    records: Mutex<BTreeMap<String, BaselineRecord>>,
}

impl BaselineStore {
    /// Open (or create) the store under `<base>/baselines/`.
    pub fn open(base: &Path) -> Result<Self> {
        let base_dir = base.join("baselines");
        std::fs::create_dir_all(&base_dir)?;
        let metadata_path = base_dir.join("metadata.json");

        let records = if metadata_path.exists() {
            let text = std::fs::read_to_string(&metadata_path)?;
            serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %metadata_path.display(), error = %e, "baseline index unreadable");
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };

        Ok(BaselineStore {
            base_dir,
            metadata_path,
            records: Mutex::new(records),
        })
    }

    fn persist(&self, records: &BTreeMap<String, BaselineRecord>) -> Result<()> {
        let text = serde_json::to_string_pretty(records)?;
        let tmp = self.metadata_path.with_extension("json.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.metadata_path)?;
        Ok(())
    }

    /// Persist a baseline image and return its id. The image file is
    /// written before the index so a crash cannot index a missing file.
    pub fn save(
        &self,
        image: &Frame,
        name: &str,
        description: Option<&str>,
        tags: Option<Vec<String>>,
    ) -> Result<String> {
        if image.is_empty() {
            return Err(EngineError::InvalidFrame(
                "baseline image is empty".to_string(),
            ));
        }
        let baseline_id = Uuid::new_v4().to_string();
        let image_path = self.base_dir.join(format!("{baseline_id}.jpg"));
        save_frame_jpeg(image, &image_path)?;

        let record = BaselineRecord {
            baseline_id: baseline_id.clone(),
            name: name.to_string(),
            description: description.unwrap_or_default().to_string(),
            tags: tags.unwrap_or_default(),
            image_path,
            image_size: (image.width(), image.height()),
            created_at: Utc::now(),
        };

        let mut records = self.records.lock().expect("baseline index lock");
        records.insert(baseline_id.clone(), record);
        self.persist(&records)?;
        Ok(baseline_id)
    }

    /// The record, or None when unknown or its file has gone missing.
    pub fn get(&self, baseline_id: &str) -> Option<BaselineRecord> {
        let records = self.records.lock().expect("baseline index lock");
        records
            .get(baseline_id)
            .filter(|record| record.image_path.exists())
            .cloned()
    }

    /// Decode the stored image.
    pub fn get_image(&self, baseline_id: &str) -> Result<Frame> {
        let record = self
            .get(baseline_id)
            .ok_or_else(|| EngineError::NotFound(format!("baseline {baseline_id}")))?;
        load_frame(&record.image_path)
    }

    /// All records whose image files still exist.
    pub fn list(&self) -> Vec<BaselineRecord> {
        let records = self.records.lock().expect("baseline index lock");
        records
            .values()
            .filter(|record| record.image_path.exists())
            .cloned()
            .collect()
    }

    pub fn update(
        &self,
        baseline_id: &str,
        name: Option<&str>,
        description: Option<&str>,
        tags: Option<Vec<String>>,
    ) -> Result<BaselineRecord> {
        let mut records = self.records.lock().expect("baseline index lock");
        let record = records
            .get_mut(baseline_id)
            .ok_or_else(|| EngineError::NotFound(format!("baseline {baseline_id}")))?;
        if let Some(name) = name {
            record.name = name.to_string();
        }
        if let Some(description) = description {
            record.description = description.to_string();
        }
        if let Some(tags) = tags {
            record.tags = tags;
        }
        let updated = record.clone();
        self.persist(&records)?;
        Ok(updated)
    }

    pub fn delete(&self, baseline_id: &str) -> Result<()> {
        let mut records = self.records.lock().expect("baseline index lock");
        let record = records
            .remove(baseline_id)
            .ok_or_else(|| EngineError::NotFound(format!("baseline {baseline_id}")))?;
        if record.image_path.exists()
            && let Err(e) = std::fs::remove_file(&record.image_path)
        {
            warn!(path = %record.image_path.display(), error = %e, "baseline file not removed");
        }
        self.persist(&records)
    }
}
