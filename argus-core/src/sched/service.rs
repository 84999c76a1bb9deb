//! The scheduler service: loads persisted tasks, fires them on their
//! cron triggers through a bounded job pool, and records every run.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use argus_model::{
    OutputSpec, ScheduledTask, TaskExecution, TaskKind, TaskSpec, TaskStatus,
};

use crate::error::{EngineError, Result};
use crate::pipeline::frame::FramePipeline;
#[cfg(feature = "ffmpeg")]
use crate::pipeline::video::VideoPipeline;

use super::cron::CronSchedule;
use super::jobs;
use super::store::TaskStore;

/// At most this many jobs run at once.
const MAX_CONCURRENT_JOBS: usize = 3;
/// Trigger evaluation cadence; fine enough for minute-granular cron.
const TICK_INTERVAL: Duration = Duration::from_secs(20);

/// Field-wise patch for [`Scheduler::update_task`]. Absent fields keep
/// their current values.
#[derive(Debug, Default, Clone, serde::Deserialize)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<TaskKind>,
    pub cron_expression: Option<String>,
    pub enabled: Option<bool>,
    pub config: Option<TaskSpec>,
    pub output: Option<OutputSpec>,
}

pub struct Scheduler {
    store: Arc<TaskStore>,
    pipeline: Arc<FramePipeline>,
    #[cfg(feature = "ffmpeg")]
    video_pipeline: Arc<VideoPipeline>,
    job_permits: Arc<Semaphore>,
    /// Fire keys currently queued or running; dedupes manual fires.
    inflight: Arc<Mutex<HashSet<String>>>,
    tick_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<TaskStore>,
        pipeline: Arc<FramePipeline>,
        #[cfg(feature = "ffmpeg")] video_pipeline: Arc<VideoPipeline>,
    ) -> Self {
        Scheduler {
            store,
            pipeline,
            #[cfg(feature = "ffmpeg")]
            video_pipeline,
            job_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_JOBS)),
            inflight: Arc::new(Mutex::new(HashSet::new())),
            tick_handle: Mutex::new(None),
        }
    }

    /// Load persisted tasks, stamp their next fire times, and start the
    /// trigger loop.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let tasks = self.store.all_tasks();
        let now = Utc::now();
        for mut task in tasks.iter().cloned() {
            if !task.enabled {
                continue;
            }
            match CronSchedule::parse(&task.cron_expression) {
                Ok(schedule) => {
                    task.next_run_at = schedule.next_after(now);
                    self.store.save_task(&task)?;
                }
                Err(e) => {
                    warn!(task = %task.id, error = %e, "task has an invalid cron expression");
                }
            }
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut last_tick = Utc::now();
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = Utc::now();
                scheduler.fire_due_tasks(last_tick, now);
                last_tick = now;
            }
        });
        *self.tick_handle.lock().expect("tick handle lock") = Some(handle);
        info!(tasks = tasks.len(), "scheduler started");
        Ok(())
    }

    /// Stop evaluating triggers. Running jobs are not cancellable and
    /// finish on their own.
    pub fn shutdown(&self) {
        if let Some(handle) = self.tick_handle.lock().expect("tick handle lock").take() {
            handle.abort();
        }
        info!("scheduler stopped");
    }

    fn fire_due_tasks(self: &Arc<Self>, since: DateTime<Utc>, now: DateTime<Utc>) {
        for task in self.store.all_tasks() {
            if !task.enabled {
                continue;
            }
            let Ok(schedule) = CronSchedule::parse(&task.cron_expression) else {
                continue;
            };
            if schedule.due(since, now) {
                self.spawn_fire(task.id.clone(), task.id.clone());
            }
        }
    }

    /// Queue one fire of `task_id` under a dedupe key. Returns the
    /// execution id, or None when an identical fire is already queued.
    fn spawn_fire(self: &Arc<Self>, task_id: String, fire_key: String) -> Option<String> {
        {
            let mut inflight = self.inflight.lock().expect("inflight lock");
            if !inflight.insert(fire_key.clone()) {
                return None;
            }
        }

        let Some(task) = self.store.get_task(&task_id) else {
            self.inflight.lock().expect("inflight lock").remove(&fire_key);
            return None;
        };

        // The execution exists before the job runs so manual callers can
        // poll it immediately.
        let execution = TaskExecution::create(&task);
        let execution_id = execution.id.clone();
        if let Err(e) = self.store.save_execution(&execution) {
            error!(task = %task_id, error = %e, "failed to persist execution");
            self.inflight.lock().expect("inflight lock").remove(&fire_key);
            return None;
        }

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let permit = scheduler
                .job_permits
                .clone()
                .acquire_owned()
                .await
                .expect("scheduler semaphore closed");
            let blocking_scheduler = Arc::clone(&scheduler);
            let blocking_execution = execution.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                blocking_scheduler.run_execution(&task_id, blocking_execution)
            })
            .await;
            drop(permit);
            if let Err(e) = outcome {
                error!(error = %e, "scheduled job task failed to join");
            }
            scheduler
                .inflight
                .lock()
                .expect("inflight lock")
                .remove(&fire_key);
        });
        Some(execution_id)
    }

    /// One complete fire: re-read the task, run the job, merge counts or
    /// the failure into the execution, stamp last/next run times.
    fn run_execution(&self, task_id: &str, mut execution: TaskExecution) {
        let Some(mut task) = self.store.get_task(task_id) else {
            execution.complete(false, Some(format!("task {task_id} no longer exists")));
            let _ = self.store.save_execution(&execution);
            return;
        };

        execution.status = TaskStatus::Running;
        if let Err(e) = self.store.save_execution(&execution) {
            warn!(task = task_id, error = %e, "failed to persist running state");
        }

        let outcome = jobs::run_job(
            &task,
            &execution.id,
            &self.pipeline,
            #[cfg(feature = "ffmpeg")]
            &self.video_pipeline,
        );
        match outcome {
            Ok(result) => {
                execution.total_items = result.total;
                execution.normal_count = result.normal;
                execution.abnormal_count = result.abnormal;
                execution.error_count = result.errors;
                execution.report_path = result.report_path;
                execution.complete(true, None);
                info!(task = task_id, execution = %execution.id, "job completed");
            }
            Err(e) => {
                execution.complete(false, Some(e.to_string()));
                error!(task = task_id, execution = %execution.id, error = %e, "job failed");
            }
        }

        task.last_run_at = execution.started_at;
        task.next_run_at = CronSchedule::parse(&task.cron_expression)
            .ok()
            .and_then(|schedule| schedule.next_after(Utc::now()))
            .filter(|_| task.enabled);
        if let Err(e) = self.store.save_task(&task) {
            warn!(task = task_id, error = %e, "failed to persist task run times");
        }
        if let Err(e) = self.store.save_execution(&execution) {
            warn!(task = task_id, error = %e, "failed to persist execution result");
        }
    }

    // Control operations

    pub fn create_task(&self, mut task: ScheduledTask) -> Result<ScheduledTask> {
        let schedule = CronSchedule::parse(&task.cron_expression)?;
        if task.enabled {
            task.next_run_at = schedule.next_after(Utc::now());
        }
        self.store.save_task(&task)?;
        Ok(task)
    }

    pub fn get_task(&self, task_id: &str) -> Result<ScheduledTask> {
        self.store
            .get_task(task_id)
            .ok_or_else(|| EngineError::NotFound(format!("task {task_id}")))
    }

    pub fn list_tasks(&self) -> Vec<ScheduledTask> {
        self.store.all_tasks()
    }

    /// Apply a field-wise patch. Re-arms the trigger when the enabled
    /// state or expression changed.
    pub fn update_task(&self, task_id: &str, update: TaskUpdate) -> Result<ScheduledTask> {
        let mut task = self.get_task(task_id)?;

        if let Some(name) = update.name {
            task.name = name;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(kind) = update.kind {
            task.kind = kind;
        }
        if let Some(expression) = update.cron_expression {
            CronSchedule::parse(&expression)?;
            task.cron_expression = expression;
        }
        if let Some(enabled) = update.enabled {
            task.enabled = enabled;
        }
        if let Some(config) = update.config {
            task.config = config;
        }
        if let Some(output) = update.output {
            task.output = output;
        }

        task.updated_at = Utc::now();
        task.next_run_at = if task.enabled {
            CronSchedule::parse(&task.cron_expression)?.next_after(Utc::now())
        } else {
            None
        };
        self.store.save_task(&task)?;
        Ok(task)
    }

    pub fn delete_task(&self, task_id: &str) -> Result<()> {
        if !self.store.delete_task(task_id)? {
            return Err(EngineError::NotFound(format!("task {task_id}")));
        }
        Ok(())
    }

    pub fn enable_task(&self, task_id: &str) -> Result<ScheduledTask> {
        self.update_task(
            task_id,
            TaskUpdate {
                enabled: Some(true),
                ..TaskUpdate::default()
            },
        )
    }

    /// Disable the task and clear its next fire time.
    pub fn disable_task(&self, task_id: &str) -> Result<ScheduledTask> {
        self.update_task(
            task_id,
            TaskUpdate {
                enabled: Some(false),
                ..TaskUpdate::default()
            },
        )
    }

    /// Enqueue a one-off fire outside the cron schedule, deduped so a
    /// task cannot be queued manually twice at once. Returns the new
    /// execution id for polling.
    pub fn run_task_now(self: &Arc<Self>, task_id: &str) -> Result<String> {
        let task = self.get_task(task_id)?;
        self.spawn_fire(task.id.clone(), format!("{task_id}_manual"))
            .ok_or_else(|| {
                EngineError::InvalidInput(format!(
                    "task {task_id} already has a manual run queued"
                ))
            })
    }

    pub fn get_executions(&self, task_id: Option<&str>, limit: usize) -> Vec<TaskExecution> {
        self.store.get_executions(task_id, limit)
    }

    pub fn get_execution(&self, execution_id: &str) -> Result<TaskExecution> {
        self.store
            .get_execution(execution_id)
            .ok_or_else(|| EngineError::NotFound(format!("execution {execution_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_config::Thresholds;
    use argus_model::Frame;

    use crate::detectors::registry::DetectorRegistry;
    use crate::imageio::save_frame_jpeg;
    use crate::pipeline::sampler::FrameSampler;

    fn scheduler(dir: &std::path::Path) -> Arc<Scheduler> {
        let store = Arc::new(TaskStore::open(dir.join("scheduler.yaml")).unwrap());
        let pipeline = Arc::new(FramePipeline::new(
            Arc::new(DetectorRegistry::builtin()),
            Thresholds::default(),
            "normal",
        ));
        Arc::new(Scheduler::new(
            store,
            pipeline,
            #[cfg(feature = "ffmpeg")]
            Arc::new(VideoPipeline::new(
                VideoPipeline::default_detectors(),
                FrameSampler::default(),
            )),
        ))
    }

    #[test]
    fn task_crud_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path());

        let created = scheduler
            .create_task(ScheduledTask::create("nightly"))
            .unwrap();
        assert!(created.next_run_at.is_some());

        let fetched = scheduler.get_task(&created.id).unwrap();
        assert_eq!(fetched.name, "nightly");

        let updated = scheduler
            .update_task(
                &created.id,
                TaskUpdate {
                    cron_expression: Some("*/10 * * * *".to_string()),
                    description: Some("every ten minutes".to_string()),
                    ..TaskUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.cron_expression, "*/10 * * * *");
        assert!(updated.updated_at >= created.updated_at);

        let disabled = scheduler.disable_task(&created.id).unwrap();
        assert!(!disabled.enabled);
        assert!(disabled.next_run_at.is_none());

        let enabled = scheduler.enable_task(&created.id).unwrap();
        assert!(enabled.next_run_at.is_some());

        scheduler.delete_task(&created.id).unwrap();
        assert!(scheduler.get_task(&created.id).is_err());
        assert!(scheduler.delete_task(&created.id).is_err());
    }

    #[test]
    fn invalid_cron_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path());
        let mut task = ScheduledTask::create("broken");
        task.cron_expression = "every day at noon".to_string();
        assert!(scheduler.create_task(task).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn manual_run_produces_a_consistent_execution() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path());

        let mut task = ScheduledTask::create("manual");
        task.config.input_path = dir.path().join("input");
        task.output.path = dir.path().join("reports");
        std::fs::create_dir_all(&task.config.input_path).unwrap();
        for i in 0..3 {
            save_frame_jpeg(
                &Frame::filled(48, 48, (i * 60) as u8, 120, 180),
                &task.config.input_path.join(format!("{i}.jpg")),
            )
            .unwrap();
        }
        let task = scheduler.create_task(task).unwrap();

        let execution_id = scheduler.run_task_now(&task.id).unwrap();

        // Poll until the job settles.
        let mut execution = scheduler.get_execution(&execution_id).unwrap();
        for _ in 0..200 {
            if matches!(execution.status, TaskStatus::Completed | TaskStatus::Failed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            execution = scheduler.get_execution(&execution_id).unwrap();
        }

        assert_eq!(execution.status, TaskStatus::Completed);
        assert_eq!(execution.total_items, 3);
        assert!(execution.counts_consistent());
        assert!(execution.report_path.is_some());

        let task = scheduler.get_task(&task.id).unwrap();
        assert!(task.last_run_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_jobs_record_the_error_and_keep_the_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(dir.path());

        let mut task = ScheduledTask::create("bad pattern");
        task.config.pattern = "[".to_string();
        let task = scheduler.create_task(task).unwrap();

        let execution_id = scheduler.run_task_now(&task.id).unwrap();
        let mut execution = scheduler.get_execution(&execution_id).unwrap();
        for _ in 0..200 {
            if matches!(execution.status, TaskStatus::Completed | TaskStatus::Failed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            execution = scheduler.get_execution(&execution_id).unwrap();
        }

        assert_eq!(execution.status, TaskStatus::Failed);
        assert!(execution.error_message.is_some());
        // The trigger survives a failed run.
        assert!(scheduler.get_task(&task.id).is_ok());
    }
}
