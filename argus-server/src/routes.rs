//! Versioned route table.

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{baselines, diagnose, streams, system, tasks, video};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        // System
        .route("/api/v1/health", get(system::health))
        .route("/api/v1/detectors", get(system::list_detectors))
        .route("/api/v1/profiles", get(system::list_profiles))
        // Still frames
        .route("/api/v1/diagnose", post(diagnose::diagnose_upload))
        .route("/api/v1/diagnose/json", post(diagnose::diagnose_json))
        // Video files
        .route("/api/v1/video/diagnose", post(video::diagnose_video))
        // Live streams
        .route(
            "/api/v1/streams",
            post(streams::start_stream).get(streams::list_streams),
        )
        .route("/api/v1/streams/{id}", delete(streams::stop_stream))
        .route("/api/v1/streams/{id}/status", get(streams::stream_status))
        .route("/api/v1/streams/{id}/results", get(streams::stream_results))
        // Scheduled tasks
        .route(
            "/api/v1/tasks",
            post(tasks::create_task).get(tasks::list_tasks),
        )
        .route(
            "/api/v1/tasks/{id}",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/v1/tasks/{id}/enable", post(tasks::enable_task))
        .route("/api/v1/tasks/{id}/disable", post(tasks::disable_task))
        .route("/api/v1/tasks/{id}/run", post(tasks::run_task_now))
        .route("/api/v1/tasks/{id}/executions", get(tasks::task_executions))
        .route("/api/v1/executions/{id}", get(tasks::get_execution))
        // Baselines
        .route(
            "/api/v1/baselines",
            post(baselines::create_baseline).get(baselines::list_baselines),
        )
        .route(
            "/api/v1/baselines/{id}",
            get(baselines::get_baseline)
                .put(baselines::update_baseline)
                .delete(baselines::delete_baseline),
        )
        .route(
            "/api/v1/baselines/{id}/compare",
            post(baselines::compare_with_baseline),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
