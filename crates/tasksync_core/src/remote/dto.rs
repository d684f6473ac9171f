use crate::error::AppError;
use crate::model::Task;
use crate::model::timestamp::truncate_to_millis;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Task as exchanged with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&Task> for TaskDto {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            due_date: task.due_date,
            completed: task.is_completed,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

impl TryFrom<TaskDto> for Task {
    type Error = AppError;

    fn try_from(dto: TaskDto) -> Result<Self, Self::Error> {
        let task = Task {
            id: dto.id,
            title: dto.title,
            description: dto.description,
            due_date: dto.due_date.map(truncate_to_millis),
            is_completed: dto.completed,
            created_at: truncate_to_millis(dto.created_at),
            updated_at: truncate_to_millis(dto.updated_at),
        };
        task.validate()?;
        Ok(task)
    }
}
