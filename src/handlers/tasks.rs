//! Task API handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use tracing::info;

use super::read_json;
use crate::error::ApiError;
use crate::server::AppState;
use crate::tasks::{CreateTaskRequest, PatchTaskRequest, Task};

/// Task list response
#[derive(Serialize)]
pub struct TaskList {
    pub tasks: Vec<Task>,
}

/// List every task
pub async fn list(State(state): State<Arc<AppState>>) -> Json<TaskList> {
    Json(TaskList {
        tasks: state.tasks.list().await,
    })
}

/// Create a task from `{title, description?, dueDate?, tag?}`
pub async fn create(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let request: CreateTaskRequest = read_json(body)?;
    let input = request.validate().map_err(ApiError::validation)?;
    let task = state.tasks.create(input).await?;
    info!(task_id = %task.id, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.tasks.get(&task_id).await?))
}

/// Apply a partial update. The body is validated before the id is looked up.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Task>, ApiError> {
    let request: PatchTaskRequest = read_json(body)?;
    let patch = request.validate().map_err(ApiError::validation)?;
    let task = state.tasks.update(&task_id, patch).await?;
    info!(task_id = %task.id, "Task updated");
    Ok(Json(task))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.tasks.delete(&task_id).await?;
    info!(task_id = %task_id, "Task deleted");
    Ok(StatusCode::NO_CONTENT)
}
