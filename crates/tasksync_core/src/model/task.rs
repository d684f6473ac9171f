use crate::error::AppError;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Task {
    /// Checks the row-level invariants every stored or received task must hold.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.id.trim().is_empty() {
            return Err(AppError::invalid_data("task id is required"));
        }
        if self.title.trim().is_empty() {
            return Err(AppError::invalid_data(format!(
                "task {} has an empty title",
                self.id
            )));
        }
        if self.updated_at < self.created_at {
            return Err(AppError::invalid_data(format!(
                "task {} was updated before it was created",
                self.id
            )));
        }
        Ok(())
    }

    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.due_date.is_some_and(|due| due < now)
    }
}

/// Fields supplied by the caller when creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due_date: Option<OffsetDateTime>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<Option<OffsetDateTime>>,
    pub is_completed: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due_date.is_none()
            && self.is_completed.is_none()
    }
}

pub fn describe_due(due: Option<Date>, today: Date) -> String {
    let Some(due) = due else {
        return "No due date".to_string();
    };

    match (due - today).whole_days() {
        0 => "Due Today".to_string(),
        1 => "Due Tomorrow".to_string(),
        -1 => "Due Yesterday".to_string(),
        days if days > 1 => format!("Due in {days} days"),
        days => format!("Overdue by {} days", -days),
    }
}
