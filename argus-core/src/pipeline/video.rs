//! Per-video diagnosis pipeline: sample frames from a source, run the
//! video detectors, fold their segments into a timed verdict.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, warn};

use argus_model::{
    VideoDetectionResult, VideoDiagnosis, VideoIssue, VideoSeverity, issues,
};

use crate::detectors::VideoDetector;
use crate::detectors::video::{FreezeDetector, SceneChangeDetector, ShakeDetector};
use crate::error::Result;

use super::sampler::FrameSampler;
use super::source::FrameSource;

pub struct VideoPipeline {
    detectors: Vec<Arc<dyn VideoDetector>>,
    sampler: FrameSampler,
}

impl VideoPipeline {
    pub fn new(detectors: Vec<Arc<dyn VideoDetector>>, sampler: FrameSampler) -> Self {
        VideoPipeline { detectors, sampler }
    }

    /// Freeze + scene change + shake, in that order.
    pub fn default_detectors() -> Vec<Arc<dyn VideoDetector>> {
        vec![
            Arc::new(FreezeDetector::default()),
            Arc::new(SceneChangeDetector::default()),
            Arc::new(ShakeDetector::default()),
        ]
    }

    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }

    /// Diagnose a video file on disk.
    #[cfg(feature = "ffmpeg")]
    pub fn diagnose_path(&self, path: &std::path::Path) -> Result<VideoDiagnosis> {
        let mut reader = crate::capture::VideoReader::open(path)?;
        let video_id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        self.diagnose_source(&mut reader, &path.to_string_lossy(), &video_id)
    }

    /// Diagnose an already-opened frame source. Failure to read frames
    /// surfaces to the caller; detector failures are contained.
    pub fn diagnose_source(
        &self,
        source: &mut dyn FrameSource,
        video_path: &str,
        video_id: &str,
    ) -> Result<VideoDiagnosis> {
        let start = Instant::now();
        let info = source.info().clone();

        let sampled = self.sampler.sample(source)?;
        if sampled.is_empty() {
            warn!(video = video_path, "sampling produced no frames");
            return Ok(VideoDiagnosis {
                video_path: video_path.to_string(),
                video_id: video_id.to_string(),
                width: info.width,
                height: info.height,
                fps: info.fps,
                duration: info.duration,
                frame_count: info.frame_count,
                sampled_frames: 0,
                is_abnormal: true,
                overall_score: 0.0,
                primary_issue: Some(issues::NO_FRAMES.to_string()),
                severity: VideoSeverity::Error,
                issues: Vec::new(),
                detection_results: Vec::new(),
                process_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            });
        }

        let mut detection_results: Vec<VideoDetectionResult> = Vec::new();
        for detector in &self.detectors {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                detector.detect(&sampled.frames, info.fps, &sampled.timestamps)
            }));
            match outcome {
                Ok(result) => detection_results.push(result),
                Err(_) => {
                    error!(detector = detector.name(), "video detector panicked");
                }
            }
        }

        let mut diagnosis = Self::aggregate(
            video_path,
            video_id,
            &info,
            sampled.len(),
            detection_results,
        );
        diagnosis.process_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        Ok(diagnosis)
    }

    fn aggregate(
        video_path: &str,
        video_id: &str,
        info: &super::source::SourceInfo,
        sampled_frames: usize,
        detection_results: Vec<VideoDetectionResult>,
    ) -> VideoDiagnosis {
        let mut issues_list: Vec<VideoIssue> = Vec::new();
        for result in detection_results.iter().filter(|r| r.is_abnormal) {
            for segment in &result.segments {
                issues_list.push(VideoIssue {
                    issue_type: result.issue_type.clone(),
                    severity: result.severity,
                    start_time: segment.start_time,
                    end_time: segment.end_time,
                    duration: segment.duration,
                    confidence: segment.confidence,
                    description: result.explanation.clone(),
                });
            }
        }
        issues_list.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        // Worst severity wins the primary slot; earlier results win ties.
        let mut primary_issue: Option<String> = None;
        let mut max_severity = VideoSeverity::Normal;
        for result in detection_results.iter().filter(|r| r.is_abnormal) {
            if result.severity > max_severity {
                max_severity = result.severity;
                primary_issue = Some(result.issue_type.clone());
            }
        }
        if primary_issue.is_none() {
            primary_issue = detection_results
                .iter()
                .find(|r| r.is_abnormal)
                .map(|r| r.issue_type.clone());
        }

        let overall_score = (100.0
            - detection_results
                .iter()
                .map(|r| r.severity.score_penalty())
                .sum::<f64>())
        .max(0.0);
        let is_abnormal = detection_results.iter().any(|r| r.is_abnormal);

        VideoDiagnosis {
            video_path: video_path.to_string(),
            video_id: video_id.to_string(),
            width: info.width,
            height: info.height,
            fps: info.fps,
            duration: info.duration,
            frame_count: info.frame_count,
            sampled_frames,
            is_abnormal,
            overall_score,
            primary_issue,
            severity: max_severity,
            issues: issues_list,
            detection_results,
            process_time_ms: 0.0,
        }
    }
}

impl Default for VideoPipeline {
    fn default() -> Self {
        VideoPipeline::new(Self::default_detectors(), FrameSampler::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::sampler::SampleStrategy;
    use crate::pipeline::source::MemorySource;
    use argus_model::Frame;

    fn all_frames_pipeline() -> VideoPipeline {
        VideoPipeline::new(
            VideoPipeline::default_detectors(),
            FrameSampler {
                strategy: SampleStrategy::All,
                max_frames: 1000,
                ..FrameSampler::default()
            },
        )
    }

    fn varying(i: usize) -> Frame {
        Frame::filled(32, 32, (40 + (i % 8) * 25) as u8, 0, 0)
    }

    #[test]
    fn empty_source_reports_no_frames() {
        let pipeline = all_frames_pipeline();
        let mut source = MemorySource::new(Vec::new(), 30.0);
        let diagnosis = pipeline.diagnose_source(&mut source, "empty.mp4", "empty").unwrap();
        assert!(diagnosis.is_abnormal);
        assert_eq!(diagnosis.primary_issue.as_deref(), Some(issues::NO_FRAMES));
        assert_eq!(diagnosis.severity, VideoSeverity::Error);
        assert_eq!(diagnosis.sampled_frames, 0);
    }

    #[test]
    fn frozen_clip_is_flagged_with_segments() {
        let pipeline = all_frames_pipeline();
        let mut frames: Vec<Frame> = (0..30).map(varying).collect();
        frames.extend((0..60).map(|_| Frame::filled(32, 32, 120, 120, 120)));
        frames.extend((0..30).map(varying));
        let mut source = MemorySource::new(frames, 30.0);

        let diagnosis = pipeline.diagnose_source(&mut source, "freeze.mp4", "freeze").unwrap();
        assert!(diagnosis.is_abnormal);
        let freeze = diagnosis
            .detection_results
            .iter()
            .find(|r| r.detector_name == "freeze")
            .unwrap();
        assert!(freeze.is_abnormal);
        assert_eq!(freeze.segments.len(), 1);
        assert!(diagnosis.overall_score < 100.0);
        assert!(!diagnosis.issues.is_empty());
    }

    #[test]
    fn issues_are_time_ordered() {
        let pipeline = all_frames_pipeline();
        // Scene-change storm: every 10th frame flips color.
        let frames: Vec<Frame> = (0..200)
            .map(|i| {
                if (i / 10) % 2 == 0 {
                    Frame::filled(32, 32, 0, 0, 255)
                } else {
                    Frame::filled(32, 32, 255, 0, 0)
                }
            })
            .collect();
        let mut source = MemorySource::new(frames, 30.0);
        let diagnosis = pipeline.diagnose_source(&mut source, "storm.mp4", "storm").unwrap();
        assert!(diagnosis.is_abnormal);
        assert_eq!(diagnosis.primary_issue.as_deref(), Some(issues::SCENE_CHANGE));
        for pair in diagnosis.issues.windows(2) {
            assert!(pair[0].start_time <= pair[1].start_time);
        }
        for issue in &diagnosis.issues {
            assert!(issue.start_time <= issue.end_time);
        }
    }

    #[test]
    fn quiet_clip_scores_full_marks() {
        let pipeline = all_frames_pipeline();
        let frames: Vec<Frame> = (0..60).map(varying).collect();
        let mut source = MemorySource::new(frames, 30.0);
        let diagnosis = pipeline.diagnose_source(&mut source, "ok.mp4", "ok").unwrap();
        assert!(!diagnosis.is_abnormal);
        assert_eq!(diagnosis.overall_score, 100.0);
        assert_eq!(diagnosis.severity, VideoSeverity::Normal);
        assert!(diagnosis.primary_issue.is_none());
    }
}
