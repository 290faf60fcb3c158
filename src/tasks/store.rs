//! JSON-file backed task store.
//!
//! The file is read once, on first access, into an in-memory cache. Every
//! mutation is applied to a copy of the cache, the whole collection is
//! written back to disk, and only then is the copy committed. A failed write
//! therefore leaves both the cache and the file at their previous state.
//!
//! # Concurrency
//!
//! One `tokio::sync::Mutex` guards the cache *and* the file write, so
//! concurrent requests are serialized end to end and writes never interleave.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::model::{FieldError, NewTask, Task, TaskPatch};

/// Errors surfaced by [`TaskStore`] operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No task with this id.
    #[error("task not found: {task_id}")]
    NotFound { task_id: String },

    /// The request payload failed validation.
    #[error("invalid task payload")]
    Validation(Vec<FieldError>),

    /// The collection could not be written; the change was not applied.
    #[error("failed to persist tasks to '{path}': {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The collection could not be encoded.
    #[error("failed to encode tasks: {0}")]
    Encode(#[from] serde_json::Error),
}

/// In-memory task cache mirrored to a JSON array on disk.
#[derive(Debug)]
pub struct TaskStore {
    path: PathBuf,
    cache: Mutex<Option<Vec<Task>>>,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All tasks in insertion order.
    pub async fn list(&self) -> Vec<Task> {
        let mut guard = self.cache.lock().await;
        self.loaded(&mut guard).await.clone()
    }

    pub async fn get(&self, task_id: &str) -> Result<Task, TaskError> {
        let mut guard = self.cache.lock().await;
        self.loaded(&mut guard)
            .await
            .iter()
            .find(|task| task.id == task_id)
            .cloned()
            .ok_or_else(|| not_found(task_id))
    }

    pub async fn create(&self, input: NewTask) -> Result<Task, TaskError> {
        let mut guard = self.cache.lock().await;
        let mut next = self.loaded(&mut guard).await.clone();
        let task = Task::create(input, Utc::now());
        next.push(task.clone());
        self.commit(&mut guard, next).await?;
        debug!(task_id = %task.id, "Task created");
        Ok(task)
    }

    pub async fn update(&self, task_id: &str, patch: TaskPatch) -> Result<Task, TaskError> {
        let mut guard = self.cache.lock().await;
        let mut next = self.loaded(&mut guard).await.clone();
        let task = next
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| not_found(task_id))?;
        task.apply(patch, Utc::now());
        let updated = task.clone();
        self.commit(&mut guard, next).await?;
        debug!(task_id = %task_id, "Task updated");
        Ok(updated)
    }

    pub async fn delete(&self, task_id: &str) -> Result<(), TaskError> {
        let mut guard = self.cache.lock().await;
        let mut next = self.loaded(&mut guard).await.clone();
        let before = next.len();
        next.retain(|task| task.id != task_id);
        if next.len() == before {
            return Err(not_found(task_id));
        }
        self.commit(&mut guard, next).await?;
        debug!(task_id = %task_id, "Task deleted");
        Ok(())
    }

    /// The cached collection, reading the file on first use.
    async fn loaded<'a>(&self, guard: &'a mut MutexGuard<'_, Option<Vec<Task>>>) -> &'a Vec<Task> {
        if guard.is_none() {
            **guard = Some(load(&self.path).await);
        }
        guard.get_or_insert_with(Vec::new)
    }

    async fn commit(
        &self,
        guard: &mut MutexGuard<'_, Option<Vec<Task>>>,
        next: Vec<Task>,
    ) -> Result<(), TaskError> {
        persist(&self.path, &next).await?;
        **guard = Some(next);
        Ok(())
    }
}

fn not_found(task_id: &str) -> TaskError {
    TaskError::NotFound {
        task_id: task_id.to_string(),
    }
}

/// Read the collection; any failure yields an empty one.
async fn load(path: &Path) -> Vec<Task> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read task file, starting empty");
            return Vec::new();
        },
    };
    match serde_json::from_slice(&raw) {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Task file is not a valid task array, starting empty");
            Vec::new()
        },
    }
}

/// Rewrite the whole collection: write a sibling temp file, then rename it
/// over the target.
async fn persist(path: &Path, tasks: &[Task]) -> Result<(), TaskError> {
    let io_error = |source| TaskError::Persist {
        path: path.display().to_string(),
        source,
    };
    let body = serde_json::to_vec_pretty(tasks)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    let staging = path.with_extension("json.tmp");
    tokio::fs::write(&staging, &body).await.map_err(io_error)?;
    tokio::fs::rename(&staging, path).await.map_err(io_error)
}
