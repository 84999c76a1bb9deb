//! Diagnosis pipelines: per-frame fan-out with suppression, per-video
//! sampling and aggregation.

pub mod frame;
pub mod sampler;
pub mod source;
pub mod video;
