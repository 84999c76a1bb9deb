//! Kind-specific batch jobs fired by the scheduler. Each job walks a
//! directory, diagnoses the matches, and writes a JSON report.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rayon::prelude::*;
use serde_json::json;
use tracing::{info, warn};

use argus_model::{ScheduledTask, TaskKind};

use crate::error::{EngineError, Result};
use crate::imageio::load_frame;
use crate::pipeline::frame::FramePipeline;
#[cfg(feature = "ffmpeg")]
use crate::pipeline::video::VideoPipeline;

/// Counts and artifacts one job run produced.
#[derive(Debug, Default, Clone)]
pub struct JobOutcome {
    /// Files attempted.
    pub total: usize,
    pub normal: usize,
    pub abnormal: usize,
    pub errors: usize,
    pub report_path: Option<String>,
}

/// Dispatch to the job matching the task kind.
pub fn run_job(
    task: &ScheduledTask,
    execution_id: &str,
    pipeline: &FramePipeline,
    #[cfg(feature = "ffmpeg")] video_pipeline: &VideoPipeline,
) -> Result<JobOutcome> {
    match task.kind {
        TaskKind::Batch => batch_detect_job(task, execution_id, pipeline),
        TaskKind::Sample => sample_detect_job(task, execution_id, pipeline),
        #[cfg(feature = "ffmpeg")]
        TaskKind::Video => video_detect_job(task, execution_id, video_pipeline),
        #[cfg(not(feature = "ffmpeg"))]
        TaskKind::Video => Err(EngineError::Internal(
            "video tasks require the ffmpeg feature".to_string(),
        )),
    }
}

/// Files under `input` matching the filename pattern.
fn find_files(input: &Path, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let matcher = glob::Pattern::new(pattern)
        .map_err(|e| EngineError::InvalidInput(format!("bad file pattern {pattern:?}: {e}")))?;

    let walker = if recursive {
        walkdir::WalkDir::new(input)
    } else {
        walkdir::WalkDir::new(input).max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| matcher.matches(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    Ok(files)
}

fn write_report(
    task: &ScheduledTask,
    execution_id: &str,
    results: Vec<serde_json::Value>,
    normal: usize,
    abnormal: usize,
) -> Result<PathBuf> {
    let output_dir = &task.output.path;
    std::fs::create_dir_all(output_dir)?;

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let report_path = output_dir.join(format!("batch_{}_{stamp}.json", task.id));

    let report = json!({
        "task_id": task.id,
        "task_name": task.name,
        "execution_id": execution_id,
        "timestamp": Utc::now().to_rfc3339(),
        "summary": {
            "total": results.len(),
            "normal_count": normal,
            "abnormal_count": abnormal,
        },
        "results": results,
    });
    std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
    info!(report = %report_path.display(), "job report written");
    Ok(report_path)
}

fn diagnose_files(
    files: &[PathBuf],
    task: &ScheduledTask,
    execution_id: &str,
    pipeline: &FramePipeline,
) -> Result<JobOutcome> {
    if files.is_empty() {
        warn!(
            input = %task.config.input_path.display(),
            pattern = %task.config.pattern,
            "no files matched"
        );
        return Ok(JobOutcome::default());
    }

    let level = task.config.level;
    let diagnoses: Vec<Option<(bool, serde_json::Value)>> = files
        .par_iter()
        .map(|file| match load_frame(file) {
            Ok(frame) => {
                let id = file
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
                    .unwrap_or_default();
                let diagnosis =
                    pipeline.diagnose(&frame, level, &id, &file.to_string_lossy());
                serde_json::to_value(&diagnosis)
                    .ok()
                    .map(|value| (diagnosis.is_abnormal, value))
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "file diagnosis failed");
                None
            }
        })
        .collect();

    let mut results = Vec::new();
    let mut normal = 0usize;
    let mut abnormal = 0usize;
    let mut errors = 0usize;
    for entry in diagnoses {
        match entry {
            Some((true, value)) => {
                abnormal += 1;
                results.push(value);
            }
            Some((false, value)) => {
                normal += 1;
                results.push(value);
            }
            None => errors += 1,
        }
    }

    let report_path = write_report(task, execution_id, results, normal, abnormal)?;
    Ok(JobOutcome {
        total: files.len(),
        normal,
        abnormal,
        errors,
        report_path: Some(report_path.to_string_lossy().to_string()),
    })
}

/// Frame pipeline over every matching file.
pub fn batch_detect_job(
    task: &ScheduledTask,
    execution_id: &str,
    pipeline: &FramePipeline,
) -> Result<JobOutcome> {
    let files = find_files(
        &task.config.input_path,
        &task.config.pattern,
        task.config.recursive,
    )?;
    info!(task = %task.id, files = files.len(), "batch job starting");
    diagnose_files(&files, task, execution_id, pipeline)
}

/// Frame pipeline over a uniform random subset of the matches:
/// `min(ceil(rate * n), max_samples)`, at least one file.
pub fn sample_detect_job(
    task: &ScheduledTask,
    execution_id: &str,
    pipeline: &FramePipeline,
) -> Result<JobOutcome> {
    let files = find_files(
        &task.config.input_path,
        &task.config.pattern,
        task.config.recursive,
    )?;
    if files.is_empty() {
        return Ok(JobOutcome::default());
    }

    let want = ((files.len() as f64 * task.config.sample_rate).ceil() as usize)
        .min(task.config.max_samples)
        .clamp(1, files.len());
    let mut rng = rand::rng();
    let mut picked: Vec<PathBuf> = rand::seq::index::sample(&mut rng, files.len(), want)
        .into_iter()
        .map(|i| files[i].clone())
        .collect();
    picked.sort();

    info!(task = %task.id, total = files.len(), sampled = picked.len(), "sample job starting");
    diagnose_files(&picked, task, execution_id, pipeline)
}

/// Video pipeline over matching video files.
#[cfg(feature = "ffmpeg")]
pub fn video_detect_job(
    task: &ScheduledTask,
    execution_id: &str,
    video_pipeline: &VideoPipeline,
) -> Result<JobOutcome> {
    let files = find_files(
        &task.config.input_path,
        &task.config.pattern,
        task.config.recursive,
    )?;
    if files.is_empty() {
        warn!(
            input = %task.config.input_path.display(),
            pattern = %task.config.pattern,
            "no video files matched"
        );
        return Ok(JobOutcome::default());
    }
    info!(task = %task.id, files = files.len(), "video job starting");

    let mut results = Vec::new();
    let mut normal = 0usize;
    let mut abnormal = 0usize;
    let mut errors = 0usize;
    for file in &files {
        match video_pipeline.diagnose_path(file) {
            Ok(diagnosis) => {
                if diagnosis.is_abnormal {
                    abnormal += 1;
                } else {
                    normal += 1;
                }
                if let Ok(value) = serde_json::to_value(&diagnosis) {
                    results.push(value);
                }
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "video diagnosis failed");
                errors += 1;
            }
        }
    }

    let report_path = write_report(task, execution_id, results, normal, abnormal)?;
    Ok(JobOutcome {
        total: files.len(),
        normal,
        abnormal,
        errors,
        report_path: Some(report_path.to_string_lossy().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use argus_config::Thresholds;
    use argus_model::Frame;

    use crate::detectors::registry::DetectorRegistry;
    use crate::imageio::save_frame_jpeg;

    fn pipeline() -> FramePipeline {
        FramePipeline::new(
            Arc::new(DetectorRegistry::builtin()),
            Thresholds::default(),
            "normal",
        )
    }

    fn task_over(dir: &Path, pattern: &str) -> ScheduledTask {
        let mut task = ScheduledTask::create("job test");
        task.config.input_path = dir.join("input");
        task.config.pattern = pattern.to_string();
        task.output.path = dir.join("reports");
        task
    }

    fn seed_images(dir: &Path, count: usize) {
        std::fs::create_dir_all(dir).unwrap();
        for i in 0..count {
            // Even files are black (abnormal), odd files textured.
            let frame = if i % 2 == 0 {
                Frame::filled(64, 64, 0, 0, 0)
            } else {
                let mut frame = Frame::filled(64, 64, 0, 0, 0);
                for y in 0..64 {
                    for x in 0..64 {
                        let v = ((x * 3 + y * 7 + i as u32) % 256) as u8;
                        frame.set_pixel(x, y, [v, (v / 2) + 60, v]);
                    }
                }
                frame
            };
            save_frame_jpeg(&frame, &dir.join(format!("img_{i:02}.jpg"))).unwrap();
        }
    }

    #[test]
    fn batch_job_counts_and_writes_a_report() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_over(dir.path(), "*.jpg");
        seed_images(&task.config.input_path, 4);

        let outcome = batch_detect_job(&task, "exec01", &pipeline()).unwrap();
        assert_eq!(outcome.total, 4);
        assert_eq!(outcome.normal + outcome.abnormal + outcome.errors, 4);
        assert!(outcome.abnormal >= 2, "black frames should be abnormal");

        let report_path = PathBuf::from(outcome.report_path.unwrap());
        assert!(report_path.exists());
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(report["task_id"], task.id.as_str());
        assert_eq!(report["execution_id"], "exec01");
        assert_eq!(report["summary"]["total"], 4);
        assert_eq!(report["results"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn batch_job_with_no_matches_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_over(dir.path(), "*.jpg");
        std::fs::create_dir_all(&task.config.input_path).unwrap();

        let outcome = batch_detect_job(&task, "exec02", &pipeline()).unwrap();
        assert_eq!(outcome.total, 0);
        assert!(outcome.report_path.is_none());
    }

    #[test]
    fn sample_job_respects_rate_and_floor() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = task_over(dir.path(), "*.jpg");
        task.config.sample_rate = 0.25;
        task.config.max_samples = 100;
        seed_images(&task.config.input_path, 8);

        let outcome = sample_detect_job(&task, "exec03", &pipeline()).unwrap();
        assert_eq!(outcome.total, 2);

        // A tiny rate still samples at least one file.
        task.config.sample_rate = 0.0001;
        let outcome = sample_detect_job(&task, "exec04", &pipeline()).unwrap();
        assert_eq!(outcome.total, 1);
    }

    #[test]
    fn unreadable_files_count_as_errors() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_over(dir.path(), "*.jpg");
        seed_images(&task.config.input_path, 2);
        std::fs::write(task.config.input_path.join("broken.jpg"), b"not an image").unwrap();

        let outcome = batch_detect_job(&task, "exec05", &pipeline()).unwrap();
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.normal + outcome.abnormal, 2);
    }
}
