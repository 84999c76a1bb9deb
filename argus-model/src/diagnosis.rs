use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::finding::Finding;
use crate::level::DetectionLevel;
use crate::severity::Severity;

/// Per-frame aggregate across all detectors that ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub image_id: String,
    pub image_path: String,
    /// (width, height) of the diagnosed frame.
    pub image_size: (u32, u32),

    pub is_abnormal: bool,
    /// The surviving issue with the highest detector priority, if any.
    pub primary_issue: Option<String>,
    pub severity: Severity,

    /// All findings, sorted by detector priority.
    pub findings: Vec<Finding>,
    /// Issue types hidden by a higher-priority issue.
    pub suppressed_issues: Vec<String>,
    /// Abnormal issue types that survived suppression.
    pub independent_issues: Vec<String>,

    /// detector name -> raw score.
    pub scores: BTreeMap<String, f64>,

    pub total_process_time_ms: f64,
    pub detection_level: DetectionLevel,
    pub config_profile: String,
    pub timestamp: DateTime<Utc>,
}

impl Diagnosis {
    pub fn abnormal_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_abnormal)
    }

    /// Deduplicated suggestions across all abnormal findings, in order.
    pub fn all_suggestions(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for finding in self.abnormal_findings() {
            for suggestion in &finding.suggestions {
                if !out.contains(suggestion) {
                    out.push(suggestion.clone());
                }
            }
        }
        out
    }

    /// Deduplicated possible causes across all abnormal findings, in order.
    pub fn all_causes(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for finding in self.abnormal_findings() {
            for cause in &finding.possible_causes {
                if !out.contains(cause) {
                    out.push(cause.clone());
                }
            }
        }
        out
    }
}
