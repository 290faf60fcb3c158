//! Task records and request validation
//!
//! Request bodies arrive as [`CreateTaskRequest`] / [`PatchTaskRequest`],
//! whose fields hold raw JSON so that "absent", `null` and "wrong type" stay
//! distinguishable. A single [`validate`](CreateTaskRequest::validate) pass
//! turns them into typed [`NewTask`] / [`TaskPatch`] values or a list of
//! [`FieldError`]s.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

static DUE_DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static pattern"));

/// A unit of kiosk-managed work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a fresh task with a generated id; both timestamps are `now`.
    pub fn create(input: NewTask, now: DateTime<Utc>) -> Self {
        let now = truncate_millis(now);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: input.title,
            description: input.description,
            due_date: input.due_date,
            tag: input.tag,
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the fields present in `patch` and refresh `updated_at`.
    pub fn apply(&mut self, patch: TaskPatch, now: DateTime<Utc>) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(tag) = patch.tag {
            self.tag = tag;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        self.updated_at = next_timestamp(self.updated_at, now);
    }
}

/// Validated input for a new task.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due_date: Option<String>,
    pub tag: String,
}

/// Validated partial update. `due_date: Some(None)` clears the date.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<Option<String>>,
    pub tag: Option<String>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.tag.is_none()
            && self.completed.is_none()
    }
}

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Body of `POST /api/tasks`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub tag: Option<Value>,
}

impl CreateTaskRequest {
    pub fn validate(self) -> Result<NewTask, Vec<FieldError>> {
        let mut errors = Vec::new();

        let title = match self.title {
            Some(value) => check_title(value).map_err(|e| errors.push(e)).ok(),
            None => {
                errors.push(FieldError::new("title", "title is required"));
                None
            },
        };
        let description = self
            .description
            .map(|value| check_text("description", value).map_err(|e| errors.push(e)).ok())
            .unwrap_or(Some(String::new()));
        let tag = self
            .tag
            .map(|value| check_text("tag", value).map_err(|e| errors.push(e)).ok())
            .unwrap_or(Some(String::new()));
        let due_date = match self.due_date {
            Some(value) => check_due_date(value).map_err(|e| errors.push(e)).ok(),
            None => Some(None),
        };

        match (title, description, due_date, tag) {
            (Some(title), Some(description), Some(due_date), Some(tag)) if errors.is_empty() => {
                Ok(NewTask {
                    title,
                    description,
                    due_date,
                    tag,
                })
            },
            _ => Err(errors),
        }
    }
}

/// Body of `PATCH /api/tasks/{id}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchTaskRequest {
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub tag: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub completed: Option<Value>,
}

impl PatchTaskRequest {
    pub fn validate(self) -> Result<TaskPatch, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut patch = TaskPatch::default();

        if let Some(value) = self.title {
            patch.title = check_title(value).map_err(|e| errors.push(e)).ok();
        }
        if let Some(value) = self.description {
            patch.description = check_text("description", value)
                .map_err(|e| errors.push(e))
                .ok();
        }
        if let Some(value) = self.due_date {
            patch.due_date = check_due_date(value).map_err(|e| errors.push(e)).ok();
        }
        if let Some(value) = self.tag {
            patch.tag = check_text("tag", value).map_err(|e| errors.push(e)).ok();
        }
        if let Some(value) = self.completed {
            match value {
                Value::Bool(flag) => patch.completed = Some(flag),
                _ => errors.push(FieldError::new("completed", "completed must be a boolean")),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        if patch.is_empty() {
            return Err(vec![FieldError::new(
                "body",
                "no updatable field supplied",
            )]);
        }
        Ok(patch)
    }
}

/// Strict `YYYY-MM-DD` that also names a real calendar day.
pub fn is_valid_due_date(value: &str) -> bool {
    DUE_DATE_PATTERN.is_match(value) && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// A refreshed timestamp strictly later than `previous`.
pub fn next_timestamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = truncate_millis(now);
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}

fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

fn check_title(value: Value) -> Result<String, FieldError> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        Value::String(_) => Err(FieldError::new("title", "title must not be empty")),
        _ => Err(FieldError::new("title", "title must be a string")),
    }
}

fn check_text(field: &'static str, value: Value) -> Result<String, FieldError> {
    match value {
        Value::String(text) => Ok(text),
        _ => Err(FieldError::new(field, format!("{field} must be a string"))),
    }
}

fn check_due_date(value: Value) -> Result<Option<String>, FieldError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) if text.is_empty() => Ok(None),
        Value::String(text) if is_valid_due_date(&text) => Ok(Some(text)),
        Value::String(text) => Err(FieldError::new(
            "dueDate",
            format!("dueDate must be a valid YYYY-MM-DD date, got '{text}'"),
        )),
        _ => Err(FieldError::new("dueDate", "dueDate must be a string or null")),
    }
}

/// Wraps any present value (including `null`) in `Some`, leaving absent
/// fields to `#[serde(default)]`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// RFC 3339 with millisecond precision, as browsers emit.
mod timestamp {
    use super::*;

    pub fn serialize<S>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn create(body: Value) -> Result<NewTask, Vec<FieldError>> {
        serde_json::from_value::<CreateTaskRequest>(body)
            .unwrap()
            .validate()
    }

    fn patch(body: Value) -> Result<TaskPatch, Vec<FieldError>> {
        serde_json::from_value::<PatchTaskRequest>(body)
            .unwrap()
            .validate()
    }

    #[test]
    fn due_date_must_be_a_real_day() {
        assert!(is_valid_due_date("2024-03-05"));
        assert!(is_valid_due_date("2024-02-29"));
        assert!(!is_valid_due_date("2024-13-40"));
        assert!(!is_valid_due_date("2023-02-29"));
        assert!(!is_valid_due_date("2024-3-5"));
        assert!(!is_valid_due_date("2024-03-05T00:00:00Z"));
    }

    #[test]
    fn create_requires_non_blank_title() {
        let errors = create(json!({ "title": "   " })).unwrap_err();
        assert_eq!(errors[0].field, "title");
        let errors = create(json!({ "description": "no title" })).unwrap_err();
        assert_eq!(errors[0].field, "title");
    }

    #[test]
    fn create_trims_title_and_defaults_optional_fields() {
        let task = create(json!({ "title": "  Buy milk " })).unwrap();
        assert_eq!(
            task,
            NewTask {
                title: "Buy milk".to_string(),
                ..NewTask::default()
            }
        );
    }

    #[test]
    fn create_validates_due_date() {
        assert!(create(json!({ "title": "a", "dueDate": "2024-13-40" })).is_err());
        let task = create(json!({ "title": "a", "dueDate": "2024-03-05" })).unwrap();
        assert_eq!(task.due_date.as_deref(), Some("2024-03-05"));
        let task = create(json!({ "title": "a", "dueDate": null })).unwrap();
        assert_eq!(task.due_date, None);
    }

    #[test]
    fn create_collects_every_field_error() {
        let errors = create(json!({ "title": 7, "tag": [], "dueDate": "soon" })).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["title", "tag", "dueDate"]);
    }

    #[test]
    fn patch_distinguishes_null_from_absent_due_date() {
        let cleared = patch(json!({ "dueDate": null })).unwrap();
        assert_eq!(cleared.due_date, Some(None));
        let cleared = patch(json!({ "dueDate": "" })).unwrap();
        assert_eq!(cleared.due_date, Some(None));
        let untouched = patch(json!({ "completed": true })).unwrap();
        assert_eq!(untouched.due_date, None);
    }

    #[test]
    fn patch_rejects_wrong_types() {
        assert!(patch(json!({ "completed": "yes" })).is_err());
        assert!(patch(json!({ "description": 3 })).is_err());
        assert!(patch(json!({ "title": "" })).is_err());
    }

    #[test]
    fn patch_without_known_fields_is_rejected() {
        let errors = patch(json!({ "colour": "red" })).unwrap_err();
        assert_eq!(errors[0].field, "body");
        assert!(patch(json!({})).is_err());
    }

    #[test]
    fn apply_always_advances_updated_at() {
        let now = Utc::now();
        let mut task = Task::create(
            NewTask {
                title: "Buy milk".to_string(),
                ..NewTask::default()
            },
            now,
        );
        assert_eq!(task.created_at, task.updated_at);

        let flip = TaskPatch {
            completed: Some(true),
            ..TaskPatch::default()
        };
        task.apply(flip.clone(), now);
        let first = task.updated_at;
        task.apply(flip, now);
        assert!(task.completed);
        assert!(task.updated_at > first);
        assert!(first > task.created_at);
    }

    #[test]
    fn serializes_camel_case_with_millisecond_timestamps() {
        let at = DateTime::parse_from_rfc3339("2024-01-01T10:00:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let task = Task::create(
            NewTask {
                title: "B".to_string(),
                due_date: Some("2024-01-01".to_string()),
                ..NewTask::default()
            },
            at,
        );
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["dueDate"], json!("2024-01-01"));
        assert_eq!(value["createdAt"], json!("2024-01-01T10:00:00.123Z"));
        assert_eq!(value["completed"], json!(false));

        let back: Task = serde_json::from_value(value).unwrap();
        assert_eq!(back, task);
    }
}
