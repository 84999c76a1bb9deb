//! Live-stream ingestion: a per-stream supervisor with a capture loop,
//! an analysis loop, and a rolling result history.

pub mod service;
pub mod worker;

pub use service::StreamService;
pub use worker::{StreamOptions, StreamWorker};
