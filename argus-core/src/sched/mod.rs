//! Cron-driven batch scheduler: persisted task definitions, a bounded
//! job pool, and per-run execution records.

pub mod cron;
pub mod jobs;
pub mod service;
pub mod store;

pub use cron::CronSchedule;
pub use jobs::JobOutcome;
pub use service::Scheduler;
pub use store::TaskStore;
