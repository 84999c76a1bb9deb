use serde::{Deserialize, Serialize};

use crate::evidence::Evidence;
use crate::issues;
use crate::level::DetectionLevel;
use crate::severity::Severity;

/// One detector's verdict on one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Stable detector name, matches the registry key.
    pub detector_name: String,
    /// Issue type from the known set, or a `*_normal` sentinel.
    pub issue_type: String,
    pub is_abnormal: bool,
    /// Raw score; the meaning is detector-defined.
    pub score: f64,
    /// Boundary the score was compared against.
    pub threshold: f64,
    /// Confidence in the verdict, clamped to [0, 1].
    pub confidence: f64,
    pub severity: Severity,

    pub explanation: String,
    #[serde(default)]
    pub possible_causes: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub evidence: Evidence,

    pub process_time_ms: f64,
    pub detection_level: DetectionLevel,
}

impl Finding {
    /// Whether the issue type is the "nothing wrong" sentinel.
    pub fn is_normal_sentinel(&self) -> bool {
        issues::is_normal(&self.issue_type)
    }

    /// A finding is well-formed when its numeric fields are finite, the
    /// confidence is a probability, and the severity agrees with the
    /// abnormal flag. Malformed findings are dropped by the pipeline.
    pub fn is_well_formed(&self) -> bool {
        self.score.is_finite()
            && self.threshold.is_finite()
            && (0.0..=1.0).contains(&self.confidence)
            && (self.is_abnormal == self.severity.is_abnormal())
            && (self.is_abnormal != self.is_normal_sentinel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(is_abnormal: bool, severity: Severity, issue: &str) -> Finding {
        Finding {
            detector_name: "blur".into(),
            issue_type: issue.into(),
            is_abnormal,
            score: 42.0,
            threshold: 100.0,
            confidence: 0.6,
            severity,
            explanation: String::new(),
            possible_causes: vec![],
            suggestions: vec![],
            evidence: Evidence::new(),
            process_time_ms: 0.0,
            detection_level: DetectionLevel::Standard,
        }
    }

    #[test]
    fn severity_must_agree_with_abnormal_flag() {
        assert!(finding(true, Severity::Warning, "blur").is_well_formed());
        assert!(finding(false, Severity::Normal, "blur_normal").is_well_formed());
        assert!(!finding(true, Severity::Normal, "blur").is_well_formed());
        assert!(!finding(false, Severity::Warning, "blur_normal").is_well_formed());
    }

    #[test]
    fn normal_findings_need_the_sentinel() {
        assert!(!finding(false, Severity::Normal, "blur").is_well_formed());
        assert!(!finding(true, Severity::Critical, "blur_normal").is_well_formed());
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let mut f = finding(true, Severity::Warning, "blur");
        f.score = f64::NAN;
        assert!(!f.is_well_formed());
    }
}
