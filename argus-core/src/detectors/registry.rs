//! Process-wide detector registry.
//!
//! Entries are populated once at startup by explicit `register` calls;
//! there is no dynamic add/remove during normal operation. Instances are
//! memoized per (name, thresholds fingerprint) so repeated lookups within
//! a run share detectors; the cache can be cleared between runs.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use argus_config::Thresholds;
use argus_model::DetectionLevel;

use super::blur::BlurDetector;
use super::brightness::BrightnessDetector;
use super::color::ColorDetector;
use super::contrast::ContrastDetector;
use super::noise::NoiseDetector;
use super::occlusion::OcclusionDetector;
use super::signal_loss::SignalLossDetector;
use super::stripe::StripeDetector;
use super::{Detector, DetectorMetadata};

type Factory = fn(&Thresholds) -> Arc<dyn Detector>;

struct Entry {
    metadata: &'static DetectorMetadata,
    factory: Factory,
}

pub struct DetectorRegistry {
    /// Registration order is preserved; it breaks priority ties.
    entries: Vec<Entry>,
    by_name: HashMap<&'static str, usize>,
    cache: DashMap<(&'static str, u64), Arc<dyn Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        DetectorRegistry {
            entries: Vec::new(),
            by_name: HashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Registry with every built-in still-frame detector. The baseline
    /// comparator is not here: it needs a reference frame at construction
    /// and is instantiated directly by callers that hold one.
    pub fn builtin() -> Self {
        let mut registry = DetectorRegistry::new();
        registry.register(&super::signal_loss::METADATA, |t| {
            Arc::new(SignalLossDetector::new(t))
        });
        registry.register(&super::color::METADATA, |t| Arc::new(ColorDetector::new(t)));
        registry.register(&super::occlusion::METADATA, |t| {
            Arc::new(OcclusionDetector::new(t))
        });
        registry.register(&super::brightness::METADATA, |t| {
            Arc::new(BrightnessDetector::new(t))
        });
        registry.register(&super::blur::METADATA, |t| Arc::new(BlurDetector::new(t)));
        registry.register(&super::noise::METADATA, |t| Arc::new(NoiseDetector::new(t)));
        registry.register(&super::contrast::METADATA, |t| {
            Arc::new(ContrastDetector::new(t))
        });
        registry.register(&super::stripe::METADATA, |t| {
            Arc::new(StripeDetector::new(t))
        });
        registry
    }

    /// Add a detector factory. Re-registering a name replaces the factory
    /// and drops its cached instances.
    pub fn register(&mut self, metadata: &'static DetectorMetadata, factory: Factory) {
        if let Some(&index) = self.by_name.get(metadata.name) {
            self.entries[index] = Entry { metadata, factory };
            self.cache.retain(|(name, _), _| *name != metadata.name);
            return;
        }
        self.by_name.insert(metadata.name, self.entries.len());
        self.entries.push(Entry { metadata, factory });
    }

    /// Instance for `name`, memoized on the thresholds fingerprint.
    pub fn get(&self, name: &str, thresholds: &Thresholds) -> Option<Arc<dyn Detector>> {
        let &index = self.by_name.get(name)?;
        let entry = &self.entries[index];
        let key = (entry.metadata.name, thresholds.fingerprint());
        let instance = self
            .cache
            .entry(key)
            .or_insert_with(|| (entry.factory)(thresholds))
            .clone();
        Some(instance)
    }

    /// All detectors supporting `level`, sorted by ascending priority.
    /// Ties keep registration order.
    pub fn get_by_level(
        &self,
        level: DetectionLevel,
        thresholds: &Thresholds,
    ) -> Vec<Arc<dyn Detector>> {
        let mut selected: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|entry| entry.metadata.supports(level))
            .collect();
        selected.sort_by_key(|entry| entry.metadata.priority);
        selected
            .iter()
            .filter_map(|entry| self.get(entry.metadata.name, thresholds))
            .collect()
    }

    pub fn list(&self) -> Vec<&'static DetectorMetadata> {
        self.entries.iter().map(|entry| entry.metadata).collect()
    }

    pub fn info(&self, name: &str) -> Option<&'static DetectorMetadata> {
        let &index = self.by_name.get(name)?;
        Some(self.entries[index].metadata)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_all_frame_detectors() {
        let registry = DetectorRegistry::builtin();
        assert_eq!(registry.len(), 8);
        for name in [
            "signal_loss",
            "color",
            "occlusion",
            "brightness",
            "blur",
            "noise",
            "contrast",
            "stripe",
        ] {
            assert!(registry.is_registered(name), "missing {name}");
        }
    }

    #[test]
    fn level_lookup_sorts_by_priority() {
        let registry = DetectorRegistry::builtin();
        let thresholds = Thresholds::default();
        let detectors = registry.get_by_level(DetectionLevel::Standard, &thresholds);
        assert_eq!(detectors.len(), 8);
        let priorities: Vec<u32> = detectors.iter().map(|d| d.metadata().priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
        assert_eq!(detectors[0].metadata().name, "signal_loss");
    }

    #[test]
    fn instances_are_memoized_per_fingerprint() {
        let registry = DetectorRegistry::builtin();
        let thresholds = Thresholds::default();
        let a = registry.get("blur", &thresholds).unwrap();
        let b = registry.get("blur", &thresholds).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let mut other = Thresholds::default();
        other.blur_threshold = 50.0;
        let c = registry.get("blur", &other).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));

        registry.clear_cache();
        let d = registry.get("blur", &thresholds).unwrap();
        assert!(!Arc::ptr_eq(&a, &d));
    }

    #[test]
    fn unknown_names_return_none() {
        let registry = DetectorRegistry::builtin();
        assert!(registry.get("nonexistent", &Thresholds::default()).is_none());
        assert!(registry.info("nonexistent").is_none());
    }
}
