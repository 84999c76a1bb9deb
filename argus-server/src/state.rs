use std::sync::Arc;

use argus_config::{AppConfig, Thresholds, preset};
use argus_core::baseline::BaselineStore;
use argus_core::pipeline::frame::FramePipeline;
use argus_core::pipeline::sampler::FrameSampler;
use argus_core::pipeline::video::VideoPipeline;
use argus_core::sched::{Scheduler, TaskStore};
use argus_core::stream::StreamService;
use argus_core::{DetectorRegistry, Result};

/// Shared server state: the engine services wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<DetectorRegistry>,
    pub pipeline: Arc<FramePipeline>,
    pub streams: Arc<StreamService>,
    pub scheduler: Arc<Scheduler>,
    pub baselines: Arc<BaselineStore>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self> {
        let registry = Arc::new(DetectorRegistry::builtin());
        let pipeline = Arc::new(FramePipeline::from_config(Arc::clone(&registry), &config)?);

        let video_pipeline = Arc::new(VideoPipeline::new(
            VideoPipeline::default_detectors(),
            FrameSampler::default(),
        ));
        let store = Arc::new(TaskStore::open(
            config.storage.data_dir.join("scheduler.yaml"),
        )?);
        let scheduler = Arc::new(Scheduler::new(
            store,
            Arc::clone(&pipeline),
            Arc::clone(&video_pipeline),
        ));
        let baselines = Arc::new(BaselineStore::open(&config.storage.data_dir)?);
        let streams = Arc::new(StreamService::new(Arc::clone(&pipeline)));

        Ok(AppState {
            config: Arc::new(config),
            registry,
            pipeline,
            streams,
            scheduler,
            baselines,
            http: reqwest::Client::new(),
        })
    }

    /// Per-request pipeline honoring an explicit profile, falling back
    /// to the preconfigured one.
    pub fn pipeline_for(&self, profile: Option<&str>) -> Result<Arc<FramePipeline>> {
        match profile {
            None => Ok(Arc::clone(&self.pipeline)),
            Some(name) => {
                let thresholds: Thresholds = preset(name)?.thresholds;
                let pipeline =
                    FramePipeline::new(Arc::clone(&self.registry), thresholds, name)
                        .with_parallel(self.config.parallel_detection)
                        .with_max_workers(self.config.max_workers);
                Ok(Arc::new(pipeline))
            }
        }
    }
}
