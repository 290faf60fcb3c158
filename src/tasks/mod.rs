//! Kiosk task records and their persistent store.

pub mod model;
pub mod store;

pub use model::{
    CreateTaskRequest, FieldError, NewTask, PatchTaskRequest, Task, TaskPatch,
};
pub use store::{TaskError, TaskStore};
