//! Scheduled-task management.

use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde_json::json;

use argus_core::sched::service::TaskUpdate;
use argus_model::{ScheduledTask, TaskKind};

use crate::api_types::{ExecutionsQuery, TaskCreateBody, envelope};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// `POST /api/v1/tasks`
pub async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<TaskCreateBody>,
) -> AppResult<Json<serde_json::Value>> {
    let mut task = ScheduledTask::create(body.name);
    if let Some(description) = body.description {
        task.description = description;
    }
    if let Some(kind) = body.kind {
        task.kind =
            TaskKind::from_str(&kind).map_err(|e| AppError::invalid_input(e.to_string()))?;
    }
    if let Some(expression) = body.cron_expression {
        task.cron_expression = expression;
    }
    if let Some(enabled) = body.enabled {
        task.enabled = enabled;
    }
    if let Some(config) = body.config {
        task.config = config;
    }
    if let Some(output) = body.output {
        task.output = output;
    }

    let created = state.scheduler.create_task(task)?;
    Ok(Json(envelope(created)))
}

/// `GET /api/v1/tasks`
pub async fn list_tasks(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(envelope(state.scheduler.list_tasks()))
}

/// `GET /api/v1/tasks/{id}`
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    Ok(Json(envelope(state.scheduler.get_task(&task_id)?)))
}

/// `PUT /api/v1/tasks/{id}`
pub async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(update): Json<TaskUpdate>,
) -> AppResult<Json<serde_json::Value>> {
    Ok(Json(envelope(state.scheduler.update_task(&task_id, update)?)))
}

/// `DELETE /api/v1/tasks/{id}`
pub async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.scheduler.delete_task(&task_id)?;
    Ok(Json(envelope(json!({ "deleted": task_id }))))
}

/// `POST /api/v1/tasks/{id}/enable`
pub async fn enable_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    Ok(Json(envelope(state.scheduler.enable_task(&task_id)?)))
}

/// `POST /api/v1/tasks/{id}/disable`
pub async fn disable_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    Ok(Json(envelope(state.scheduler.disable_task(&task_id)?)))
}

/// `POST /api/v1/tasks/{id}/run` — one-off fire outside the schedule.
pub async fn run_task_now(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let execution_id = state.scheduler.run_task_now(&task_id)?;
    Ok(Json(envelope(json!({
        "task_id": task_id,
        "execution_id": execution_id,
    }))))
}

/// `GET /api/v1/tasks/{id}/executions`
pub async fn task_executions(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<ExecutionsQuery>,
) -> AppResult<Json<serde_json::Value>> {
    // 404 for unknown tasks rather than an empty list.
    state.scheduler.get_task(&task_id)?;
    let executions = state
        .scheduler
        .get_executions(Some(&task_id), query.limit.unwrap_or(50));
    Ok(Json(envelope(executions)))
}

/// `GET /api/v1/executions/{id}`
pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    Ok(Json(envelope(state.scheduler.get_execution(&execution_id)?)))
}
