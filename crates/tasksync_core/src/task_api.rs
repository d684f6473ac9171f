use crate::clock::Clock;
use crate::error::AppError;
use crate::model::timestamp::parse_rfc3339;
use crate::model::{NewTask, Task, TaskPatch};
use crate::storage::sqlite_store::{TaskFeed, TaskStore};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};
use uuid::Uuid;

pub fn add_task(store: &TaskStore, clock: &impl Clock, new: NewTask) -> Result<Task, AppError> {
    let title = new.title.trim();
    if title.is_empty() {
        return Err(AppError::invalid_input("title is required"));
    }

    let now = clock.now();
    let task = Task {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        description: new.description.trim().to_string(),
        due_date: new.due_date,
        is_completed: false,
        created_at: now,
        updated_at: now,
    };
    store.upsert(&task)?;
    log::debug!("added task {}", task.id);
    Ok(task)
}

pub fn list_tasks(store: &TaskStore) -> Result<Vec<Task>, AppError> {
    store.list_all()
}

/// Current tasks first, then a fresh snapshot after every write.
pub fn watch_tasks(store: &TaskStore) -> Result<TaskFeed, AppError> {
    store.watch()
}

pub fn get_task(store: &TaskStore, id: &str) -> Result<Task, AppError> {
    let id = require_id(id)?;
    store
        .get(id)?
        .ok_or_else(|| AppError::not_found(format!("task {id} not found")))
}

pub fn edit_task(
    store: &TaskStore,
    clock: &impl Clock,
    id: &str,
    patch: TaskPatch,
) -> Result<Task, AppError> {
    if patch.is_empty() {
        return Err(AppError::invalid_input("nothing to change"));
    }

    let mut task = get_task(store, id)?;
    if let Some(title) = patch.title {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::invalid_input("title is required"));
        }
        task.title = title.to_string();
    }
    if let Some(description) = patch.description {
        task.description = description.trim().to_string();
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = due_date;
    }
    if let Some(is_completed) = patch.is_completed {
        task.is_completed = is_completed;
    }

    touch(&mut task, clock);
    store.update(&task)?;
    Ok(task)
}

pub fn set_completed(
    store: &TaskStore,
    clock: &impl Clock,
    id: &str,
    is_completed: bool,
) -> Result<Task, AppError> {
    let mut task = get_task(store, id)?;
    task.is_completed = is_completed;
    touch(&mut task, clock);
    store.update(&task)?;
    Ok(task)
}

pub fn toggle_task(store: &TaskStore, clock: &impl Clock, id: &str) -> Result<Task, AppError> {
    let task = get_task(store, id)?;
    set_completed(store, clock, id, !task.is_completed)
}

pub fn delete_task(store: &TaskStore, id: &str) -> Result<Task, AppError> {
    let id = require_id(id)?;
    store
        .delete(id)?
        .ok_or_else(|| AppError::not_found(format!("task {id} not found")))
}

/// Accepts RFC3339, or a bare `YYYY-MM-DD` taken as local midnight.
pub fn parse_due_input(value: &str) -> Result<OffsetDateTime, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("due date is required"));
    }

    if let Ok(date) = Date::parse(trimmed, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_offset(local_offset()));
    }

    parse_rfc3339("due", trimmed)
        .map_err(|_| AppError::invalid_input("due must be RFC3339 or YYYY-MM-DD"))
}

pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

pub fn today(clock: &impl Clock) -> Date {
    clock.now().to_offset(local_offset()).date()
}

fn require_id(id: &str) -> Result<&str, AppError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::invalid_input("id is required"));
    }
    Ok(id)
}

/// Bumps `updated_at` strictly past the previous stamp, even when that stamp
/// came from a server clock running ahead of ours.
fn touch(task: &mut Task, clock: &impl Clock) {
    task.updated_at = clock.now().max(task.updated_at + Duration::milliseconds(1));
}
