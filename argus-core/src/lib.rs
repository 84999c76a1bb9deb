//! # Argus Core
//!
//! Detection engine for the Argus video/image quality diagnosis platform.
//!
//! ## Overview
//!
//! The engine turns frames and frame sequences into structured abnormality
//! reports:
//!
//! - **Detectors**: analytic per-frame checks (blur, brightness, contrast,
//!   color, noise, stripes, occlusion, signal loss, baseline comparison)
//!   plus video-scoped checks (freeze, scene change, shake)
//! - **Pipelines**: per-frame fan-out with priority/suppression
//!   reconciliation, and per-video sampling plus segment aggregation
//! - **Stream ingestion**: reconnecting RTSP/RTMP capture with bounded
//!   buffering and a rolling result history
//! - **Scheduler**: cron-driven batch jobs over directories with a
//!   file-backed task store

pub mod baseline;
#[cfg(feature = "ffmpeg")]
pub mod capture;
pub mod detectors;
pub mod error;
pub mod imageio;
pub mod imageops;
pub mod pipeline;
pub mod sched;
#[cfg(feature = "ffmpeg")]
pub mod stream;

pub use detectors::registry::DetectorRegistry;
pub use detectors::{Detector, DetectorMetadata, VideoDetector};
pub use error::{EngineError, Result};
pub use pipeline::frame::FramePipeline;
pub use pipeline::sampler::{FrameSampler, SampleStrategy};
pub use pipeline::source::{FrameSource, MemorySource, SourceInfo};
pub use pipeline::video::VideoPipeline;
pub use sched::Scheduler;
#[cfg(feature = "ffmpeg")]
pub use stream::{StreamService, StreamWorker};
