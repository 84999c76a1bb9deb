//! Per-stream supervisor: a capture thread feeding a bounded frame
//! channel, an analyze thread draining it on a slower cadence.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::{debug, info, warn};
use uuid::Uuid;

use argus_model::{
    DetectionLevel, Frame, Severity, StreamKind, StreamResult, StreamState, StreamStatus,
    VideoSeverity,
};

use crate::capture::StreamCapture;
use crate::detectors::VideoDetector;
use crate::pipeline::frame::FramePipeline;
use crate::pipeline::video::VideoPipeline;

/// Cadences, bounds, and retry policy of one ingested stream.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub kind: StreamKind,
    /// Seconds between frames kept from the capture loop.
    pub sample_interval: f64,
    /// Seconds between analysis ticks.
    pub detection_interval: f64,
    /// Frame channel capacity; oldest frames are dropped when full.
    pub buffer_size: usize,
    pub reconnect_interval: f64,
    pub max_reconnect_attempts: u32,
    pub history_limit: usize,
    pub level: DetectionLevel,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            kind: StreamKind::Rtsp,
            sample_interval: 1.0,
            detection_interval: 5.0,
            buffer_size: 30,
            reconnect_interval: 5.0,
            max_reconnect_attempts: 10,
            history_limit: 100,
            level: DetectionLevel::Standard,
        }
    }
}

/// Invoked on every analysis result when configured.
pub type ResultCallback = Arc<dyn Fn(&StreamResult) + Send + Sync>;

type BufferedFrame = (Frame, f64, u64);

struct Shared {
    running: AtomicBool,
    connected: AtomicBool,
    frames_received: AtomicU64,
    frames_analyzed: AtomicU64,
    connection_errors: AtomicU64,
    reconnect_count: AtomicU32,
    /// FPS estimate, stored as bits.
    fps: AtomicU64,
    history: Mutex<VecDeque<StreamResult>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl Shared {
    fn fps(&self) -> f64 {
        f64::from_bits(self.fps.load(Ordering::Relaxed))
    }

    fn set_fps(&self, fps: f64) {
        self.fps.store(fps.to_bits(), Ordering::Relaxed);
    }
}

pub struct StreamWorker {
    stream_id: String,
    url: String,
    options: StreamOptions,
    pipeline: Arc<FramePipeline>,
    callback: Option<ResultCallback>,
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamWorker {
    pub fn new(
        url: impl Into<String>,
        stream_id: Option<String>,
        options: StreamOptions,
        pipeline: Arc<FramePipeline>,
        callback: Option<ResultCallback>,
    ) -> Self {
        StreamWorker {
            stream_id: stream_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            url: url.into(),
            options,
            pipeline,
            callback,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                frames_received: AtomicU64::new(0),
                frames_analyzed: AtomicU64::new(0),
                connection_errors: AtomicU64::new(0),
                reconnect_count: AtomicU32::new(0),
                fps: AtomicU64::new(0.0f64.to_bits()),
                history: Mutex::new(VecDeque::new()),
                started_at: Mutex::new(None),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Spawn the capture and analyze tasks. Returns false when the
    /// worker is already running. Connection failures do not fail the
    /// start: the capture loop owns all connect and reconnect attempts.
    pub fn start(&self) -> bool {
        if self
            .shared
            .running
            .swap(true, Ordering::AcqRel)
        {
            return false;
        }
        *self.shared.started_at.lock().expect("started_at lock") = Some(Utc::now());

        let (tx, rx) = bounded::<BufferedFrame>(self.options.buffer_size);

        let capture = {
            let shared = Arc::clone(&self.shared);
            let url = self.url.clone();
            let options = self.options.clone();
            let stream_id = self.stream_id.clone();
            let drop_rx = rx.clone();
            std::thread::Builder::new()
                .name(format!("stream-capture-{stream_id}"))
                .spawn(move || capture_loop(&url, &options, &shared, tx, drop_rx))
                .expect("spawn capture thread")
        };
        let analyze = {
            let shared = Arc::clone(&self.shared);
            let options = self.options.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let callback = self.callback.clone();
            let stream_id = self.stream_id.clone();
            let url = self.url.clone();
            std::thread::Builder::new()
                .name(format!("stream-analyze-{stream_id}"))
                .spawn(move || {
                    analyze_loop(&stream_id, &url, &options, &shared, rx, pipeline, callback)
                })
                .expect("spawn analyze thread")
        };

        let mut handles = self.handles.lock().expect("handles lock");
        handles.push(capture);
        handles.push(analyze);
        info!(stream = %self.stream_id, url = %self.url, "stream ingestion started");
        true
    }

    /// Ask both tasks to exit and join them with a short bound. Always
    /// succeeds; a task stuck in a blocking read is detached and will
    /// release its capture handle when the read returns.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        let handles: Vec<JoinHandle<()>> =
            self.handles.lock().expect("handles lock").drain(..).collect();

        let deadline = Instant::now() + Duration::from_secs(2);
        for handle in handles {
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(20));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!(stream = %self.stream_id, "worker thread slow to exit, detaching");
            }
        }
        self.shared.connected.store(false, Ordering::Release);
        info!(stream = %self.stream_id, "stream ingestion stopped");
    }

    pub fn status(&self) -> StreamStatus {
        let shared = &self.shared;
        let last_result_at = shared
            .history
            .lock()
            .expect("history lock")
            .back()
            .map(|r| r.timestamp);
        StreamStatus {
            stream_id: self.stream_id.clone(),
            stream_url: self.url.clone(),
            kind: self.options.kind,
            status: if self.is_running() {
                StreamState::Running
            } else {
                StreamState::Stopped
            },
            is_connected: shared.connected.load(Ordering::Acquire),
            fps: shared.fps(),
            frames_received: shared.frames_received.load(Ordering::Relaxed),
            frames_analyzed: shared.frames_analyzed.load(Ordering::Relaxed),
            connection_errors: shared.connection_errors.load(Ordering::Relaxed),
            reconnect_count: shared.reconnect_count.load(Ordering::Relaxed),
            started_at: *shared.started_at.lock().expect("started_at lock"),
            last_result_at,
        }
    }

    /// Most recent results, oldest first, optionally filtered to those
    /// at or after `since` (ISO-8601; unparsable values are ignored).
    pub fn results(&self, limit: usize, since: Option<&str>) -> Vec<StreamResult> {
        let since = since.and_then(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .ok()
        });
        let history = self.shared.history.lock().expect("history lock");
        let filtered: Vec<StreamResult> = history
            .iter()
            .filter(|r| since.is_none_or(|cutoff| r.timestamp >= cutoff))
            .cloned()
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).collect()
    }

    pub fn history_len(&self) -> usize {
        self.shared.history.lock().expect("history lock").len()
    }
}

fn sleep_while_running(shared: &Shared, duration: Duration) {
    let deadline = Instant::now() + duration;
    while shared.running.load(Ordering::Acquire) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50).min(duration));
    }
}

fn capture_loop(
    url: &str,
    options: &StreamOptions,
    shared: &Arc<Shared>,
    tx: Sender<BufferedFrame>,
    // The channel is MPMC; the producer holds a receiver too so it can
    // discard the oldest frame instead of blocking when full.
    drop_rx: Receiver<BufferedFrame>,
) {
    let started = Instant::now();
    let mut attempts: u32 = 0;

    while shared.running.load(Ordering::Acquire) {
        if attempts > options.max_reconnect_attempts {
            warn!(url, attempts, "reconnect attempts exhausted, stopping stream");
            shared.running.store(false, Ordering::Release);
            break;
        }
        if attempts > 0 {
            sleep_while_running(shared, Duration::from_secs_f64(options.reconnect_interval));
            if !shared.running.load(Ordering::Acquire) {
                break;
            }
        }

        let mut capture = match StreamCapture::open(url, options.kind) {
            Ok(capture) => capture,
            Err(e) => {
                debug!(url, error = %e, "stream connect failed");
                shared.connection_errors.fetch_add(1, Ordering::Relaxed);
                shared.reconnect_count.fetch_add(1, Ordering::Relaxed);
                attempts += 1;
                continue;
            }
        };
        shared.connected.store(true, Ordering::Release);
        attempts = 0;

        let mut last_sample = Instant::now() - Duration::from_secs(3600);
        loop {
            if !shared.running.load(Ordering::Acquire) {
                return;
            }
            match capture.read_frame() {
                Ok(Some((index, frame))) => {
                    let now = Instant::now();
                    if now.duration_since(last_sample).as_secs_f64()
                        < options.sample_interval
                    {
                        continue;
                    }
                    last_sample = now;

                    let timestamp = started.elapsed().as_secs_f64();
                    // Drop-oldest: the producer never blocks on a slow
                    // analyzer.
                    let mut item = (frame, timestamp, index);
                    loop {
                        match tx.try_send(item) {
                            Ok(()) => break,
                            Err(TrySendError::Full(returned)) => {
                                let _ = drop_rx.try_recv();
                                item = returned;
                            }
                            Err(TrySendError::Disconnected(_)) => return,
                        }
                    }

                    let received =
                        shared.frames_received.fetch_add(1, Ordering::Relaxed) + 1;
                    let elapsed = started.elapsed().as_secs_f64();
                    if elapsed > 0.0 {
                        shared.set_fps(received as f64 / elapsed);
                    }
                }
                Ok(None) | Err(_) => {
                    shared.connected.store(false, Ordering::Release);
                    shared.connection_errors.fetch_add(1, Ordering::Relaxed);
                    shared.reconnect_count.fetch_add(1, Ordering::Relaxed);
                    attempts = 1;
                    break;
                }
            }
        }
    }
    shared.connected.store(false, Ordering::Release);
}

fn analyze_loop(
    stream_id: &str,
    url: &str,
    options: &StreamOptions,
    shared: &Arc<Shared>,
    rx: Receiver<BufferedFrame>,
    pipeline: Arc<FramePipeline>,
    callback: Option<ResultCallback>,
) {
    let video_detectors = VideoPipeline::default_detectors();
    let mut window: VecDeque<BufferedFrame> = VecDeque::with_capacity(options.buffer_size);
    let mut last_detection = Instant::now() - Duration::from_secs(3600);

    while shared.running.load(Ordering::Acquire) {
        while let Ok(item) = rx.try_recv() {
            if window.len() == options.buffer_size {
                window.pop_front();
            }
            window.push_back(item);
        }

        if last_detection.elapsed().as_secs_f64() < options.detection_interval
            || window.is_empty()
        {
            std::thread::sleep(Duration::from_millis(100));
            continue;
        }
        last_detection = Instant::now();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            analyze_tick(
                stream_id,
                url,
                options,
                shared,
                &window,
                &pipeline,
                &video_detectors,
            )
        }));
        match outcome {
            Ok(result) => {
                {
                    let mut history = shared.history.lock().expect("history lock");
                    if history.len() == options.history_limit {
                        history.pop_front();
                    }
                    history.push_back(result.clone());
                }
                shared.frames_analyzed.fetch_add(1, Ordering::Relaxed);
                if let Some(callback) = &callback {
                    callback(&result);
                }
            }
            Err(_) => {
                shared.connection_errors.fetch_add(1, Ordering::Relaxed);
                warn!(stream = stream_id, "analysis tick panicked");
            }
        }
    }
}

fn analyze_tick(
    stream_id: &str,
    url: &str,
    options: &StreamOptions,
    shared: &Shared,
    window: &VecDeque<BufferedFrame>,
    pipeline: &FramePipeline,
    video_detectors: &[Arc<dyn VideoDetector>],
) -> StreamResult {
    let snapshot: Vec<&BufferedFrame> = window.iter().collect();
    let (latest_frame, _, _) = snapshot.last().expect("window checked non-empty");

    let image_detection = pipeline.diagnose(latest_frame, options.level, stream_id, url);

    let fps = {
        let estimate = shared.fps();
        if estimate > 0.0 { estimate } else { 25.0 }
    };
    let frames: Vec<Frame> = snapshot.iter().map(|(f, _, _)| f.clone()).collect();
    let timestamps: Vec<f64> = snapshot.iter().map(|(_, t, _)| *t).collect();
    let video_detection: Vec<_> = video_detectors
        .iter()
        .map(|detector| detector.detect(&frames, fps, &timestamps))
        .collect();

    let video_abnormal = video_detection.iter().any(|r| r.is_abnormal);
    let is_abnormal = image_detection.is_abnormal || video_abnormal;

    let primary_issue = image_detection.primary_issue.clone().or_else(|| {
        video_detection
            .iter()
            .find(|r| r.is_abnormal)
            .map(|r| r.issue_type.clone())
    });
    let severity = if image_detection.severity > Severity::Normal {
        image_detection.severity
    } else {
        video_detection
            .iter()
            .filter(|r| r.is_abnormal)
            .map(|r| match r.severity {
                VideoSeverity::Normal => Severity::Normal,
                VideoSeverity::Info => Severity::Info,
                VideoSeverity::Warning => Severity::Warning,
                VideoSeverity::Error => Severity::Critical,
            })
            .max()
            .unwrap_or(Severity::Normal)
    };

    StreamResult {
        stream_id: stream_id.to_string(),
        timestamp: Utc::now(),
        is_connected: shared.connected.load(Ordering::Acquire),
        fps,
        is_abnormal,
        image_detection,
        video_detection,
        primary_issue,
        severity,
    }
}
