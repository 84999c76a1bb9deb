//! Per-frame diagnosis pipeline: detector fan-out, priority ordering,
//! and the suppression protocol.

use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::warn;

use argus_config::{AppConfig, Thresholds};
use argus_model::{DetectionLevel, Diagnosis, Finding, Frame, Severity, issues};

use crate::detectors::Detector;
use crate::detectors::registry::DetectorRegistry;
use crate::error::Result;

/// Default hard deadline for one detector call.
pub const DETECTOR_TIMEOUT: Duration = Duration::from_secs(5);

/// Issue type -> issue types it hides in lower-priority findings.
pub type SuppressionTable = BTreeMap<String, Vec<String>>;

pub struct FramePipeline {
    registry: Arc<DetectorRegistry>,
    thresholds: Thresholds,
    profile_name: String,
    parallel: bool,
    max_workers: usize,
    detector_timeout: Duration,
    suppression: RwLock<SuppressionTable>,
}

impl FramePipeline {
    pub fn new(
        registry: Arc<DetectorRegistry>,
        thresholds: Thresholds,
        profile_name: impl Into<String>,
    ) -> Self {
        FramePipeline {
            registry,
            thresholds,
            profile_name: profile_name.into(),
            parallel: true,
            max_workers: 4,
            detector_timeout: DETECTOR_TIMEOUT,
            suppression: RwLock::new(Self::default_suppression_table()),
        }
    }

    /// Pipeline configured from application settings (profile, custom
    /// overrides, worker count).
    pub fn from_config(registry: Arc<DetectorRegistry>, config: &AppConfig) -> Result<Self> {
        let thresholds = config.thresholds()?;
        let mut pipeline = Self::new(registry, thresholds, config.profile.clone());
        pipeline.parallel = config.parallel_detection;
        pipeline.max_workers = config.max_workers.max(1);
        Ok(pipeline)
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// The built-in suppression rules.
    pub fn default_suppression_table() -> SuppressionTable {
        let hide = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut table = SuppressionTable::new();
        table.insert(
            issues::SIGNAL_LOSS.into(),
            hide(&[
                issues::TOO_DARK,
                issues::BLUR,
                issues::LOW_CONTRAST,
                issues::NO_TEXTURE,
                issues::NOISE,
            ]),
        );
        table.insert(
            issues::BLACK_SCREEN.into(),
            hide(&[
                issues::TOO_DARK,
                issues::BLUR,
                issues::LOW_CONTRAST,
                issues::NO_TEXTURE,
                issues::NOISE,
            ]),
        );
        table.insert(
            issues::WHITE_SCREEN.into(),
            hide(&[issues::TOO_BRIGHT, issues::LOW_CONTRAST, issues::BLUR]),
        );
        table.insert(
            issues::SOLID_COLOR.into(),
            hide(&[
                issues::LOW_CONTRAST,
                issues::BLUR,
                issues::NO_TEXTURE,
                issues::NOISE,
            ]),
        );
        table.insert(
            issues::BLUE_SCREEN.into(),
            hide(&[
                issues::COLOR_CAST,
                issues::LOW_CONTRAST,
                issues::LOW_SATURATION,
            ]),
        );
        table.insert(
            issues::GREEN_SCREEN.into(),
            hide(&[
                issues::COLOR_CAST,
                issues::LOW_CONTRAST,
                issues::LOW_SATURATION,
            ]),
        );
        table.insert(
            issues::SNOW_NOISE.into(),
            hide(&[issues::BLUR, issues::NOISE]),
        );
        table.insert(
            issues::OCCLUSION.into(),
            hide(&[issues::PARTIAL_BLUR, issues::BLUR]),
        );
        table
    }

    /// Add or replace a suppression rule on this pipeline instance.
    pub fn add_suppression_rule(&self, issue: &str, suppresses: Vec<String>) {
        self.suppression
            .write()
            .expect("suppression table lock")
            .insert(issue.to_string(), suppresses);
    }

    /// Remove a suppression rule. Returns whether it existed.
    pub fn remove_suppression_rule(&self, issue: &str) -> bool {
        self.suppression
            .write()
            .expect("suppression table lock")
            .remove(issue)
            .is_some()
    }

    /// Diagnose one frame with the detector set selected by `level`.
    pub fn diagnose(
        &self,
        frame: &Frame,
        level: DetectionLevel,
        image_id: &str,
        image_path: &str,
    ) -> Diagnosis {
        self.diagnose_with(frame, level, None, image_id, image_path)
    }

    /// Diagnose one frame. When `detector_names` is given, only those
    /// detectors run; unknown names are dropped with a warning.
    pub fn diagnose_with(
        &self,
        frame: &Frame,
        level: DetectionLevel,
        detector_names: Option<&[String]>,
        image_id: &str,
        image_path: &str,
    ) -> Diagnosis {
        let start = Instant::now();

        if frame.is_empty() || frame.width() < 2 || frame.height() < 2 {
            return self.error_diagnosis(image_id, image_path, level);
        }

        let detectors = self.resolve_detectors(detector_names, level);
        if detectors.is_empty() {
            return self.error_diagnosis(image_id, image_path, level);
        }

        let findings = if self.parallel && detectors.len() > 1 {
            self.run_parallel(frame, detectors, level)
        } else {
            self.run_serial(frame, &detectors, level)
        };

        let mut diagnosis = self.aggregate(findings, image_id, image_path, frame, level);
        diagnosis.total_process_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        diagnosis
    }

    /// Diagnose a batch of frames sequentially.
    pub fn diagnose_batch<'a>(
        &self,
        items: impl IntoIterator<Item = (&'a Frame, &'a str, &'a str)>,
        level: DetectionLevel,
    ) -> Vec<Diagnosis> {
        items
            .into_iter()
            .map(|(frame, id, path)| self.diagnose(frame, level, id, path))
            .collect()
    }

    fn resolve_detectors(
        &self,
        detector_names: Option<&[String]>,
        level: DetectionLevel,
    ) -> Vec<Arc<dyn Detector>> {
        match detector_names {
            Some(names) => names
                .iter()
                .filter_map(|name| {
                    let detector = self.registry.get(name, &self.thresholds);
                    if detector.is_none() {
                        warn!(detector = %name, "unknown detector requested, skipping");
                    }
                    detector
                })
                .collect(),
            None => self.registry.get_by_level(level, &self.thresholds),
        }
    }

    fn run_serial(
        &self,
        frame: &Frame,
        detectors: &[Arc<dyn Detector>],
        level: DetectionLevel,
    ) -> Vec<(usize, Finding)> {
        let mut findings = Vec::with_capacity(detectors.len());
        for (index, detector) in detectors.iter().enumerate() {
            let name = detector.metadata().name;
            match catch_unwind(AssertUnwindSafe(|| detector.detect(frame, level))) {
                Ok(finding) if finding.is_well_formed() => findings.push((index, finding)),
                Ok(_) => warn!(detector = name, "detector returned a malformed finding"),
                Err(_) => warn!(detector = name, "detector panicked"),
            }
        }
        findings
    }

    /// Fan out onto a short-lived worker pool. Workers are detached so a
    /// hung detector cannot wedge the call; its late result is simply
    /// discarded when the receiver is gone.
    fn run_parallel(
        &self,
        frame: &Frame,
        detectors: Vec<Arc<dyn Detector>>,
        level: DetectionLevel,
    ) -> Vec<(usize, Finding)> {
        let expected = detectors.len();
        let frame = Arc::new(frame.clone());
        let queue: Arc<Mutex<VecDeque<(usize, Arc<dyn Detector>)>>> =
            Arc::new(Mutex::new(detectors.into_iter().enumerate().collect()));
        let (tx, rx) = mpsc::channel::<(usize, &'static str, Option<Finding>)>();

        let workers = self.max_workers.min(expected).max(1);
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let frame = Arc::clone(&frame);
            std::thread::spawn(move || {
                loop {
                    let job = queue.lock().ok().and_then(|mut q| q.pop_front());
                    let Some((index, detector)) = job else { break };
                    let name = detector.metadata().name;
                    let outcome =
                        catch_unwind(AssertUnwindSafe(|| detector.detect(&frame, level)));
                    if tx.send((index, name, outcome.ok())).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut findings = Vec::with_capacity(expected);
        for _ in 0..expected {
            match rx.recv_timeout(self.detector_timeout) {
                Ok((index, _, Some(finding))) if finding.is_well_formed() => {
                    findings.push((index, finding));
                }
                Ok((_, name, Some(_))) => {
                    warn!(detector = name, "detector returned a malformed finding");
                }
                Ok((_, name, None)) => warn!(detector = name, "detector panicked"),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    // One slow detector forfeits its slot; the rest of
                    // the run still completes.
                    warn!(
                        timeout_ms = self.detector_timeout.as_millis() as u64,
                        "detector deadline exceeded, dropping one result"
                    );
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        findings
    }

    fn detector_priority(&self, name: &str) -> u32 {
        self.registry.info(name).map(|m| m.priority).unwrap_or(100)
    }

    fn aggregate(
        &self,
        mut findings: Vec<(usize, Finding)>,
        image_id: &str,
        image_path: &str,
        frame: &Frame,
        level: DetectionLevel,
    ) -> Diagnosis {
        // Deterministic order: ascending priority, dispatch order on
        // ties. Completion order never matters.
        findings.sort_by_key(|(index, finding)| {
            (self.detector_priority(&finding.detector_name), *index)
        });
        let findings: Vec<Finding> = findings.into_iter().map(|(_, f)| f).collect();

        let mut suppressed_issues: Vec<String> = Vec::new();
        let mut active_issues: Vec<String> = Vec::new();
        {
            let table = self.suppression.read().expect("suppression table lock");
            for finding in findings.iter().filter(|f| f.is_abnormal) {
                let issue = &finding.issue_type;
                let hidden = active_issues.iter().any(|active| {
                    table
                        .get(active)
                        .is_some_and(|list| list.iter().any(|hidden| hidden == issue))
                });
                if hidden {
                    suppressed_issues.push(issue.clone());
                } else if !active_issues.contains(issue) {
                    active_issues.push(issue.clone());
                }
            }
        }

        let primary_issue = active_issues.first().cloned();
        let severity = primary_issue
            .as_deref()
            .and_then(|primary| {
                findings
                    .iter()
                    .find(|f| f.is_abnormal && f.issue_type == primary)
                    .map(|f| f.severity)
            })
            .unwrap_or(Severity::Normal);

        let scores = findings
            .iter()
            .map(|f| (f.detector_name.clone(), f.score))
            .collect();

        Diagnosis {
            image_id: image_id.to_string(),
            image_path: image_path.to_string(),
            image_size: (frame.width(), frame.height()),
            is_abnormal: !active_issues.is_empty(),
            primary_issue,
            severity,
            findings,
            suppressed_issues,
            independent_issues: active_issues,
            scores,
            total_process_time_ms: 0.0,
            detection_level: level,
            config_profile: self.profile_name.clone(),
            timestamp: Utc::now(),
        }
    }

    fn error_diagnosis(
        &self,
        image_id: &str,
        image_path: &str,
        level: DetectionLevel,
    ) -> Diagnosis {
        Diagnosis {
            image_id: image_id.to_string(),
            image_path: image_path.to_string(),
            image_size: (0, 0),
            is_abnormal: true,
            primary_issue: Some(issues::ERROR.to_string()),
            severity: Severity::Critical,
            findings: Vec::new(),
            suppressed_issues: Vec::new(),
            independent_issues: vec![issues::ERROR.to_string()],
            scores: BTreeMap::new(),
            total_process_time_ms: 0.0,
            detection_level: level,
            config_profile: self.profile_name.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> FramePipeline {
        FramePipeline::new(
            Arc::new(DetectorRegistry::builtin()),
            Thresholds::default(),
            "normal",
        )
    }

    #[test]
    fn black_frame_promotes_signal_loss_and_suppresses_the_rest() {
        let pipeline = pipeline();
        let black = Frame::filled(640, 480, 0, 0, 0);
        let diagnosis = pipeline.diagnose(&black, DetectionLevel::Standard, "t1", "");

        assert!(diagnosis.is_abnormal);
        assert_eq!(diagnosis.primary_issue.as_deref(), Some(issues::BLACK_SCREEN));
        assert_eq!(diagnosis.severity, Severity::Critical);
        assert!(diagnosis.suppressed_issues.contains(&issues::TOO_DARK.to_string()));
        assert!(!diagnosis.independent_issues.contains(&issues::TOO_DARK.to_string()));
    }

    #[test]
    fn mid_gray_frame_reports_solid_color_with_low_contrast_suppressed() {
        let pipeline = pipeline();
        let gray = Frame::filled(640, 480, 128, 128, 128);
        let diagnosis = pipeline.diagnose(&gray, DetectionLevel::Standard, "t2", "");

        assert!(diagnosis.is_abnormal);
        assert_eq!(diagnosis.primary_issue.as_deref(), Some(issues::SOLID_COLOR));
        assert_eq!(diagnosis.severity, Severity::Warning);
        assert!(
            diagnosis
                .suppressed_issues
                .contains(&issues::LOW_CONTRAST.to_string())
        );
    }

    #[test]
    fn empty_detector_list_yields_an_error_diagnosis() {
        let pipeline = pipeline();
        let frame = Frame::filled(64, 64, 128, 128, 128);
        let names = vec!["does_not_exist".to_string()];
        let diagnosis =
            pipeline.diagnose_with(&frame, DetectionLevel::Standard, Some(&names), "t3", "");
        assert!(diagnosis.is_abnormal);
        assert_eq!(diagnosis.primary_issue.as_deref(), Some(issues::ERROR));
        assert_eq!(diagnosis.severity, Severity::Critical);
        assert!(diagnosis.findings.is_empty());
    }

    #[test]
    fn tiny_frame_yields_an_error_diagnosis() {
        let pipeline = pipeline();
        let tiny = Frame::filled(1, 1, 0, 0, 0);
        let diagnosis = pipeline.diagnose(&tiny, DetectionLevel::Standard, "t4", "");
        assert_eq!(diagnosis.primary_issue.as_deref(), Some(issues::ERROR));
    }

    #[test]
    fn explicit_detector_names_limit_the_run() {
        let pipeline = pipeline();
        let frame = Frame::filled(64, 64, 128, 128, 128);
        let names = vec!["blur".to_string(), "brightness".to_string()];
        let diagnosis =
            pipeline.diagnose_with(&frame, DetectionLevel::Standard, Some(&names), "t5", "");
        let detector_names: Vec<&str> = diagnosis
            .findings
            .iter()
            .map(|f| f.detector_name.as_str())
            .collect();
        assert_eq!(detector_names.len(), 2);
        assert!(detector_names.contains(&"blur"));
        assert!(detector_names.contains(&"brightness"));
    }

    #[test]
    fn unknown_names_are_dropped_but_known_ones_run() {
        let pipeline = pipeline();
        let frame = Frame::filled(64, 64, 128, 128, 128);
        let names = vec!["ghost".to_string(), "blur".to_string()];
        let diagnosis =
            pipeline.diagnose_with(&frame, DetectionLevel::Standard, Some(&names), "t6", "");
        assert_eq!(diagnosis.findings.len(), 1);
        assert_eq!(diagnosis.findings[0].detector_name, "blur");
    }

    #[test]
    fn serial_and_parallel_agree_up_to_timing() {
        let registry = Arc::new(DetectorRegistry::builtin());
        let serial = FramePipeline::new(registry.clone(), Thresholds::default(), "normal")
            .with_parallel(false);
        let parallel =
            FramePipeline::new(registry, Thresholds::default(), "normal").with_parallel(true);

        let frame = Frame::filled(320, 240, 30, 60, 90);
        let a = serial.diagnose(&frame, DetectionLevel::Standard, "x", "");
        let b = parallel.diagnose(&frame, DetectionLevel::Standard, "x", "");

        assert_eq!(a.primary_issue, b.primary_issue);
        assert_eq!(a.independent_issues, b.independent_issues);
        assert_eq!(a.suppressed_issues, b.suppressed_issues);
        assert_eq!(a.scores, b.scores);
        let order_a: Vec<&str> = a.findings.iter().map(|f| f.detector_name.as_str()).collect();
        let order_b: Vec<&str> = b.findings.iter().map(|f| f.detector_name.as_str()).collect();
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn determinism_with_parallel_disabled() {
        let pipeline = pipeline().with_parallel(false);
        let frame = Frame::filled(320, 240, 20, 40, 80);
        let a = pipeline.diagnose(&frame, DetectionLevel::Standard, "d", "");
        let b = pipeline.diagnose(&frame, DetectionLevel::Standard, "d", "");
        assert_eq!(a.primary_issue, b.primary_issue);
        assert_eq!(a.scores, b.scores);
        assert_eq!(a.independent_issues, b.independent_issues);
    }

    #[test]
    fn suppression_rules_can_be_added_and_removed() {
        let pipeline = pipeline();
        pipeline.add_suppression_rule("stripe", vec![issues::LOW_CONTRAST.to_string()]);
        assert!(pipeline.remove_suppression_rule("stripe"));
        assert!(!pipeline.remove_suppression_rule("stripe"));
    }

    #[test]
    fn abnormal_iff_independent_issues_nonempty() {
        let pipeline = pipeline();
        for fill in [(0u8, 0u8, 0u8), (128, 128, 128), (30, 60, 90)] {
            let frame = Frame::filled(160, 120, fill.0, fill.1, fill.2);
            let diagnosis = pipeline.diagnose(&frame, DetectionLevel::Standard, "inv", "");
            assert_eq!(diagnosis.is_abnormal, !diagnosis.independent_issues.is_empty());
            for finding in &diagnosis.findings {
                if !finding.is_abnormal {
                    assert_eq!(finding.severity, Severity::Normal);
                }
            }
        }
    }
}
