//! End-to-end video scenarios through the sampler and video pipeline.

use argus_core::detectors::video::{FreezeDetector, FreezeOptions};
use argus_core::detectors::VideoDetector;
use argus_core::pipeline::sampler::{FrameSampler, SampleStrategy};
use argus_core::pipeline::source::MemorySource;
use argus_core::pipeline::video::VideoPipeline;
use argus_model::{Frame, VideoSeverity, issues};

fn varying(i: usize) -> Frame {
    Frame::filled(48, 48, (40 + (i % 8) * 25) as u8, 30, 60)
}

fn all_frames_pipeline(max_frames: usize) -> VideoPipeline {
    VideoPipeline::new(
        VideoPipeline::default_detectors(),
        FrameSampler {
            strategy: SampleStrategy::All,
            max_frames,
            ..FrameSampler::default()
        },
    )
}

#[test]
fn sampler_all_count_law() {
    // For the ALL strategy, returned count == min(frame_count, max_frames).
    for (clip_len, max_frames) in [(50usize, 300usize), (400, 300), (300, 300)] {
        let frames: Vec<Frame> = (0..clip_len).map(varying).collect();
        let sampler = FrameSampler {
            strategy: SampleStrategy::All,
            max_frames,
            ..FrameSampler::default()
        };
        let mut source = MemorySource::new(frames, 30.0);
        let sampled = sampler.sample(&mut source).unwrap();
        assert_eq!(sampled.len(), clip_len.min(max_frames));
    }
}

#[test]
fn freeze_round_trip_law() {
    // N identical frames at 30 fps with a lowered floor yield exactly
    // one segment of duration (N-1)/30.
    let n = 45usize;
    let frames: Vec<Frame> = (0..n).map(|_| Frame::filled(48, 48, 99, 99, 99)).collect();
    let detector = FreezeDetector::new(FreezeOptions {
        min_freeze_frames: 10,
        min_freeze_duration: 0.1,
        ..FreezeOptions::default()
    });
    let result = detector.detect(&frames, 30.0, &[]);
    assert!(result.is_abnormal);
    assert_eq!(result.segments.len(), 1);
    let duration = result.segments[0].duration;
    assert!(
        (duration - (n as f64 - 1.0) / 30.0).abs() < 1e-6,
        "duration = {duration}"
    );
}

#[test]
fn freeze_video_scenario() {
    // 30 fps: frames 0-29 varying, 30-89 identical, 90-119 varying.
    let mut frames: Vec<Frame> = (0..30).map(varying).collect();
    frames.extend((0..60).map(|_| Frame::filled(48, 48, 120, 120, 120)));
    frames.extend((0..30).map(varying));
    let mut source = MemorySource::new(frames, 30.0);

    let diagnosis = all_frames_pipeline(1000)
        .diagnose_source(&mut source, "freeze.mp4", "freeze")
        .unwrap();

    assert!(diagnosis.is_abnormal);
    let freeze = diagnosis
        .detection_results
        .iter()
        .find(|r| r.detector_name == "freeze")
        .unwrap();
    assert_eq!(freeze.segments.len(), 1);
    let segment = &freeze.segments[0];
    assert!((segment.start_time - 1.0).abs() < 0.05);
    assert!((segment.end_time - 2.97).abs() < 0.05);
    assert!(segment.duration >= 1.9);
}

#[test]
fn scene_change_barrage_scenario() {
    // 10 s of 30 fps video; every 15th frame swaps between red and blue.
    let frames: Vec<Frame> = (0..300)
        .map(|i| {
            if (i / 15) % 2 == 0 {
                Frame::filled(48, 48, 0, 0, 255)
            } else {
                Frame::filled(48, 48, 255, 0, 0)
            }
        })
        .collect();
    let mut source = MemorySource::new(frames, 30.0);

    let diagnosis = all_frames_pipeline(1000)
        .diagnose_source(&mut source, "storm.mp4", "storm")
        .unwrap();

    let scene = diagnosis
        .detection_results
        .iter()
        .find(|r| r.detector_name == "scene_change")
        .unwrap();
    assert!(scene.segments.len() > 5, "segments = {}", scene.segments.len());
    assert!(scene.is_abnormal);
    assert!(diagnosis.is_abnormal);
    assert_eq!(diagnosis.primary_issue.as_deref(), Some(issues::SCENE_CHANGE));
}

#[test]
fn segment_invariants_hold_across_detectors() {
    let mut frames: Vec<Frame> = (0..20).map(varying).collect();
    frames.extend((0..40).map(|_| Frame::filled(48, 48, 77, 77, 77)));
    frames.extend((0..200).map(|i| {
        if (i / 10) % 2 == 0 {
            Frame::filled(48, 48, 0, 0, 255)
        } else {
            Frame::filled(48, 48, 255, 0, 0)
        }
    }));
    let frame_count = frames.len();
    let mut source = MemorySource::new(frames, 30.0);

    let diagnosis = all_frames_pipeline(1000)
        .diagnose_source(&mut source, "mixed.mp4", "mixed")
        .unwrap();

    for result in &diagnosis.detection_results {
        for segment in &result.segments {
            assert!(segment.start_frame <= segment.end_frame);
            assert!(segment.end_frame < frame_count);
            assert!(segment.start_time <= segment.end_time);
        }
    }
    assert!(diagnosis.overall_score <= 100.0);
    assert!(diagnosis.overall_score >= 0.0);
}

#[test]
fn max_frames_bounds_the_analysis() {
    let frames: Vec<Frame> = (0..500).map(varying).collect();
    let mut source = MemorySource::new(frames, 30.0);
    let diagnosis = all_frames_pipeline(120)
        .diagnose_source(&mut source, "long.mp4", "long")
        .unwrap();
    assert_eq!(diagnosis.sampled_frames, 120);
    assert_eq!(diagnosis.frame_count, 500);
}

#[test]
fn severity_ranking_prefers_the_worst_result() {
    // Freeze storm: a long freeze (error-level score) plus mild scene
    // changes; the diagnosis severity must match the worst result.
    let mut frames: Vec<Frame> = Vec::new();
    for _ in 0..150 {
        frames.push(Frame::filled(48, 48, 200, 120, 40));
    }
    frames.extend((0..30).map(varying));
    let mut source = MemorySource::new(frames, 30.0);

    let diagnosis = all_frames_pipeline(1000)
        .diagnose_source(&mut source, "frozen.mp4", "frozen")
        .unwrap();
    assert!(diagnosis.is_abnormal);
    let worst = diagnosis
        .detection_results
        .iter()
        .filter(|r| r.is_abnormal)
        .map(|r| r.severity)
        .max()
        .unwrap_or(VideoSeverity::Normal);
    assert_eq!(diagnosis.severity, worst);
}
