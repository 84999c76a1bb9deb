use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;
use crate::level::DetectionLevel;

/// What a scheduled task runs on each fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Frame pipeline over every matching file.
    #[default]
    Batch,
    /// Frame pipeline over a uniform random subset.
    Sample,
    /// Video pipeline over matching video files.
    Video,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Batch => "batch",
            TaskKind::Sample => "sample",
            TaskKind::Video => "video",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batch" => Ok(TaskKind::Batch),
            "sample" => Ok(TaskKind::Sample),
            "video" => Ok(TaskKind::Video),
            other => Err(ModelError::UnknownTaskKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Detection settings of one scheduled task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub input_path: PathBuf,
    pub pattern: String,
    pub recursive: bool,
    pub profile: String,
    pub level: DetectionLevel,
    /// Fraction of files a sample task picks, in (0, 1].
    pub sample_rate: f64,
    /// Hard cap on files a sample task picks.
    pub max_samples: usize,
}

impl Default for TaskSpec {
    fn default() -> Self {
        TaskSpec {
            input_path: PathBuf::from("."),
            pattern: "*.jpg".to_string(),
            recursive: true,
            profile: "normal".to_string(),
            level: DetectionLevel::Standard,
            sample_rate: 0.1,
            max_samples: 100,
        }
    }
}

/// Where and how long job reports are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub path: PathBuf,
    pub formats: Vec<String>,
    pub keep_days: u32,
}

impl Default for OutputSpec {
    fn default() -> Self {
        OutputSpec {
            path: PathBuf::from("./reports"),
            formats: vec!["json".to_string()],
            keep_days: 30,
        }
    }
}

/// Persistent cron-driven batch job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: TaskKind,
    /// Standard 5-field Unix cron expression.
    pub cron_expression: String,
    pub enabled: bool,

    #[serde(default)]
    pub config: TaskSpec,
    #[serde(default)]
    pub output: OutputSpec,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    /// New enabled task with a short random id and the default nightly
    /// schedule.
    pub fn create(name: impl Into<String>) -> Self {
        let now = Utc::now();
        ScheduledTask {
            id: short_id(),
            name: name.into(),
            description: String::new(),
            kind: TaskKind::Batch,
            cron_expression: "0 2 * * *".to_string(),
            enabled: true,
            config: TaskSpec::default(),
            output: OutputSpec::default(),
            created_at: now,
            updated_at: now,
            last_run_at: None,
            next_run_at: None,
        }
    }
}

/// One invocation of a scheduled task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub id: String,
    pub task_id: String,
    pub task_name: String,
    pub status: TaskStatus,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,

    pub total_items: usize,
    pub normal_count: usize,
    pub abnormal_count: usize,
    pub error_count: usize,

    pub report_path: Option<String>,
    pub error_message: Option<String>,
}

impl TaskExecution {
    pub fn create(task: &ScheduledTask) -> Self {
        TaskExecution {
            id: short_id(),
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            status: TaskStatus::Pending,
            started_at: Some(Utc::now()),
            finished_at: None,
            duration_seconds: 0.0,
            total_items: 0,
            normal_count: 0,
            abnormal_count: 0,
            error_count: 0,
            report_path: None,
            error_message: None,
        }
    }

    /// Stamp the end of the run and flip to completed or failed.
    pub fn complete(&mut self, success: bool, error_message: Option<String>) {
        let finished = Utc::now();
        self.status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        if let Some(started) = self.started_at {
            self.duration_seconds =
                (finished - started).num_milliseconds() as f64 / 1000.0;
        }
        self.finished_at = Some(finished);
        if error_message.is_some() {
            self.error_message = error_message;
        }
    }

    /// `total_items = normal + abnormal + error` must hold for a finished
    /// execution.
    pub fn counts_consistent(&self) -> bool {
        self.total_items == self.normal_count + self.abnormal_count + self.error_count
    }
}

/// First 8 hex characters of a v4 uuid, enough for human-scale task ids.
fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_stamps_timestamps_and_defaults() {
        let task = ScheduledTask::create("nightly sweep");
        assert_eq!(task.id.len(), 8);
        assert_eq!(task.kind, TaskKind::Batch);
        assert!(task.enabled);
        assert!(task.next_run_at.is_none());
    }

    #[test]
    fn execution_completion() {
        let task = ScheduledTask::create("t");
        let mut exec = TaskExecution::create(&task);
        exec.total_items = 5;
        exec.normal_count = 3;
        exec.abnormal_count = 1;
        exec.error_count = 1;
        exec.complete(true, None);
        assert_eq!(exec.status, TaskStatus::Completed);
        assert!(exec.finished_at.is_some());
        assert!(exec.counts_consistent());

        let mut failed = TaskExecution::create(&task);
        failed.complete(false, Some("disk full".into()));
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("disk full"));
    }

    #[test]
    fn task_yaml_round_trip() {
        let task = ScheduledTask::create("roundtrip");
        let doc = serde_json::to_string(&task).unwrap();
        let back: ScheduledTask = serde_json::from_str(&doc).unwrap();
        assert_eq!(back.id, task.id);
        assert_eq!(back.cron_expression, task.cron_expression);
    }
}
