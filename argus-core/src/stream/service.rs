//! Process-wide registry of running stream workers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use argus_model::{StreamResult, StreamStatus};

use crate::error::{EngineError, Result};
use crate::pipeline::frame::FramePipeline;

use super::worker::{ResultCallback, StreamOptions, StreamWorker};

/// Owns every live [`StreamWorker`] by stream id. Mutations are
/// serialized through the service lock; queries hold it briefly.
pub struct StreamService {
    pipeline: Arc<FramePipeline>,
    streams: Mutex<HashMap<String, Arc<StreamWorker>>>,
}

impl StreamService {
    pub fn new(pipeline: Arc<FramePipeline>) -> Self {
        StreamService {
            pipeline,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Start ingesting a stream. Reuses a running worker when the caller
    /// supplies an id that is already live.
    pub fn start_stream(
        &self,
        url: &str,
        stream_id: Option<String>,
        options: StreamOptions,
        callback: Option<ResultCallback>,
    ) -> Result<String> {
        let mut streams = self.streams.lock().expect("stream service lock");

        if let Some(id) = &stream_id
            && let Some(existing) = streams.get(id)
            && existing.is_running()
        {
            return Ok(id.clone());
        }

        let worker = Arc::new(StreamWorker::new(
            url,
            stream_id,
            options,
            Arc::clone(&self.pipeline),
            callback,
        ));
        if !worker.start() {
            return Err(EngineError::Stream(format!(
                "failed to start ingestion for {url}"
            )));
        }
        let id = worker.stream_id().to_string();
        streams.insert(id.clone(), worker);
        info!(stream = %id, url, "stream registered");
        Ok(id)
    }

    /// Stop and remove a stream. Returns whether it existed.
    pub fn stop_stream(&self, stream_id: &str) -> bool {
        let worker = {
            let mut streams = self.streams.lock().expect("stream service lock");
            streams.remove(stream_id)
        };
        match worker {
            Some(worker) => {
                worker.stop();
                true
            }
            None => false,
        }
    }

    pub fn status(&self, stream_id: &str) -> Option<StreamStatus> {
        let streams = self.streams.lock().expect("stream service lock");
        streams.get(stream_id).map(|worker| worker.status())
    }

    pub fn results(
        &self,
        stream_id: &str,
        limit: usize,
        since: Option<&str>,
    ) -> Option<Vec<StreamResult>> {
        let worker = {
            let streams = self.streams.lock().expect("stream service lock");
            streams.get(stream_id).cloned()
        };
        worker.map(|w| w.results(limit, since))
    }

    pub fn list(&self) -> Vec<StreamStatus> {
        let streams = self.streams.lock().expect("stream service lock");
        streams.values().map(|worker| worker.status()).collect()
    }

    pub fn stop_all(&self) {
        let workers: Vec<Arc<StreamWorker>> = {
            let mut streams = self.streams.lock().expect("stream service lock");
            streams.drain().map(|(_, worker)| worker).collect()
        };
        for worker in workers {
            worker.stop();
        }
    }
}
