pub mod preferences;
pub mod sqlite_store;

use crate::error::AppError;
use crate::model::Task;
use crate::sync::LocalTasks;
use preferences::PreferenceStore;
use sqlite_store::TaskStore;
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;

const APP_DIR_NAME: &str = "tasksync";

/// Resolves a data file: the env var wins, else the per-user config directory.
pub(crate) fn path_from_env_or_default(env_var: &str, file_name: &str) -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(env_var)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join(APP_DIR_NAME).join(file_name))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join(APP_DIR_NAME)
            .join(file_name))
    }
}

/// Task rows plus the sync watermark, as seen by the sync coordinator.
#[derive(Debug, Clone)]
pub struct LocalStore {
    tasks: Arc<TaskStore>,
    preferences: PreferenceStore,
}

impl LocalStore {
    pub fn new(tasks: Arc<TaskStore>, preferences: PreferenceStore) -> Self {
        Self { tasks, preferences }
    }

    /// Opens the store and preferences at their configured locations.
    pub fn open_default() -> Result<Self, AppError> {
        let tasks = TaskStore::open(&sqlite_store::store_path()?)?;
        let preferences = PreferenceStore::new(preferences::preferences_path()?);
        Ok(Self::new(Arc::new(tasks), preferences))
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }
}

impl LocalTasks for LocalStore {
    fn watermark(&self) -> Result<OffsetDateTime, AppError> {
        self.preferences.watermark()
    }

    fn set_watermark(&self, value: OffsetDateTime) -> Result<(), AppError> {
        self.preferences.set_watermark(value)
    }

    fn tasks_updated_after(&self, since: OffsetDateTime) -> Result<Vec<Task>, AppError> {
        self.tasks.list_updated_after(since)
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>, AppError> {
        self.tasks.get(id)
    }

    fn upsert_task(&self, task: &Task) -> Result<(), AppError> {
        self.tasks.upsert(task)
    }
}
