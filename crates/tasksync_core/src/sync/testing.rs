//! In-memory stand-ins for the local store and the server.

use super::LocalTasks;
use super::conflict::should_apply;
use crate::error::AppError;
use crate::model::Task;
use crate::remote::RemoteTasks;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use time::OffsetDateTime;

pub(crate) fn at(millis: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).unwrap()
}

pub(crate) fn task(id: &str, title: &str, updated_millis: i64) -> Task {
    Task {
        id: id.to_string(),
        title: title.to_string(),
        description: String::new(),
        due_date: None,
        is_completed: false,
        created_at: at(0),
        updated_at: at(updated_millis),
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeLocal {
    pub tasks: Mutex<BTreeMap<String, Task>>,
    pub watermark: Mutex<Option<OffsetDateTime>>,
    pub upsert_failures: Mutex<VecDeque<AppError>>,
    pub acknowledged: Mutex<Vec<String>>,
}

impl FakeLocal {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let local = Self::default();
        {
            let mut rows = local.tasks.lock().unwrap();
            for task in tasks {
                rows.insert(task.id.clone(), task);
            }
        }
        local
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().values().cloned().collect()
    }

    pub fn stored_watermark(&self) -> Option<OffsetDateTime> {
        *self.watermark.lock().unwrap()
    }
}

impl LocalTasks for FakeLocal {
    fn watermark(&self) -> Result<OffsetDateTime, AppError> {
        Ok(self.stored_watermark().unwrap_or(OffsetDateTime::UNIX_EPOCH))
    }

    fn set_watermark(&self, value: OffsetDateTime) -> Result<(), AppError> {
        *self.watermark.lock().unwrap() = Some(value);
        Ok(())
    }

    fn tasks_updated_after(&self, since: OffsetDateTime) -> Result<Vec<Task>, AppError> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|task| task.updated_at > since)
            .collect())
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>, AppError> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    fn upsert_task(&self, task: &Task) -> Result<(), AppError> {
        if let Some(err) = self.upsert_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.tasks
            .lock()
            .unwrap()
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn acknowledge_pushed(&self, ids: &[String]) -> Result<(), AppError> {
        self.acknowledged.lock().unwrap().extend_from_slice(ids);
        Ok(())
    }
}

/// Server that applies pushes with the same last-write-wins rule.
#[derive(Debug, Default)]
pub(crate) struct FakeRemote {
    pub tasks: Mutex<BTreeMap<String, Task>>,
    pub push_failures: Mutex<VecDeque<AppError>>,
    pub fetch_failures: Mutex<VecDeque<AppError>>,
    pub pushed: Mutex<Vec<Vec<Task>>>,
    pub push_attempts: Mutex<u32>,
    pub fetch_attempts: Mutex<u32>,
}

impl FakeRemote {
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let remote = Self::default();
        {
            let mut rows = remote.tasks.lock().unwrap();
            for task in tasks {
                rows.insert(task.id.clone(), task);
            }
        }
        remote
    }

    pub fn fail_pushes(&self, errors: impl IntoIterator<Item = AppError>) {
        self.push_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_fetches(&self, errors: impl IntoIterator<Item = AppError>) {
        self.fetch_failures.lock().unwrap().extend(errors);
    }

    pub fn push_attempts(&self) -> u32 {
        *self.push_attempts.lock().unwrap()
    }

    pub fn fetch_attempts(&self) -> u32 {
        *self.fetch_attempts.lock().unwrap()
    }
}

impl RemoteTasks for FakeRemote {
    fn fetch_since(&self, since: OffsetDateTime) -> Result<Vec<Task>, AppError> {
        *self.fetch_attempts.lock().unwrap() += 1;
        if let Some(err) = self.fetch_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|task| task.updated_at > since)
            .cloned()
            .collect())
    }

    fn push(&self, tasks: &[Task]) -> Result<(), AppError> {
        *self.push_attempts.lock().unwrap() += 1;
        if let Some(err) = self.push_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut rows = self.tasks.lock().unwrap();
        for task in tasks {
            if should_apply(task, rows.get(&task.id)) {
                rows.insert(task.id.clone(), task.clone());
            }
        }
        self.pushed.lock().unwrap().push(tasks.to_vec());
        Ok(())
    }
}
