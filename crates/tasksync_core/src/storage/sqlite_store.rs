//! SQLite-backed task table.
//!
//! Every statement runs under a single connection mutex, which is the only
//! consistency guarantee callers get: rows are independent, so no statement
//! spans more than one task.

use crate::error::AppError;
use crate::model::Task;
use crate::model::timestamp::{from_millis, to_millis};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use time::OffsetDateTime;

pub const SCHEMA_VERSION: i64 = 1;
const STORE_FILE_NAME: &str = "tasks.db";
const STORE_ENV_VAR: &str = "TASKSYNC_STORE_PATH";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        due_date INTEGER,
        is_completed INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_updated_at ON tasks (updated_at);
";

const SELECT_TASKS: &str =
    "SELECT id, title, description, due_date, is_completed, created_at, updated_at FROM tasks";
const UPSERT_TASK: &str = "INSERT OR REPLACE INTO tasks
    (id, title, description, due_date, is_completed, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";
const UPDATE_TASK: &str = "UPDATE tasks
    SET title = ?2, description = ?3, due_date = ?4, is_completed = ?5, created_at = ?6, updated_at = ?7
    WHERE id = ?1";
const DELETE_TASK: &str = "DELETE FROM tasks WHERE id = ?1";

pub fn store_path() -> Result<PathBuf, AppError> {
    super::path_from_env_or_default(STORE_ENV_VAR, STORE_FILE_NAME)
}

struct TaskRow {
    id: String,
    title: String,
    description: String,
    due_date: Option<i64>,
    is_completed: bool,
    created_at: i64,
    updated_at: i64,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            due_date: row.get(3)?,
            is_completed: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_task(self) -> Result<Task, AppError> {
        Ok(Task {
            due_date: self.due_date.map(from_millis).transpose()?,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
            id: self.id,
            title: self.title,
            description: self.description,
            is_completed: self.is_completed,
        })
    }
}

/// Receives a full snapshot of the task table after every write.
#[derive(Debug)]
pub struct TaskFeed {
    rx: Receiver<Vec<Task>>,
}

impl TaskFeed {
    /// Blocks until the next snapshot; `None` once the store is gone.
    pub fn recv(&self) -> Option<Vec<Task>> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<Task>> {
        match self.rx.recv_timeout(timeout) {
            Ok(tasks) => Some(tasks),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drains queued snapshots and returns the newest one, if any.
    pub fn latest(&self) -> Option<Vec<Task>> {
        self.rx.try_iter().last()
    }
}

#[derive(Debug)]
pub struct TaskStore {
    conn: Mutex<Connection>,
    watchers: Mutex<Vec<Sender<Vec<Task>>>>,
}

impl TaskStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AppError> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(AppError::invalid_data("schema_version mismatch"));
        }

        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
            watchers: Mutex::new(Vec::new()),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::storage("task store lock poisoned"))
    }

    pub fn get(&self, id: &str) -> Result<Option<Task>, AppError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("{SELECT_TASKS} WHERE id = ?1"),
                params![id],
                TaskRow::from_row,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    pub fn list_all(&self) -> Result<Vec<Task>, AppError> {
        self.query(&format!("{SELECT_TASKS} ORDER BY created_at ASC, id ASC"), None)
    }

    /// Tasks whose `updated_at` is strictly after `since`.
    pub fn list_updated_after(&self, since: OffsetDateTime) -> Result<Vec<Task>, AppError> {
        self.query(
            &format!("{SELECT_TASKS} WHERE updated_at > ?1 ORDER BY updated_at ASC, id ASC"),
            Some(to_millis(since)),
        )
    }

    fn query(&self, sql: &str, since: Option<i64>) -> Result<Vec<Task>, AppError> {
        let rows = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(sql)?;
            let mapped = match since {
                Some(since) => stmt.query_map(params![since], TaskRow::from_row)?,
                None => stmt.query_map([], TaskRow::from_row)?,
            };
            mapped.collect::<rusqlite::Result<Vec<_>>>()?
        };

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Inserts the task, replacing any existing row with the same id.
    pub fn upsert(&self, task: &Task) -> Result<(), AppError> {
        task.validate()?;
        {
            let conn = self.conn()?;
            write_task(&conn, UPSERT_TASK, task)?;
        }
        self.publish();
        Ok(())
    }

    pub fn update(&self, task: &Task) -> Result<(), AppError> {
        task.validate()?;
        let affected = {
            let conn = self.conn()?;
            write_task(&conn, UPDATE_TASK, task)?
        };
        if affected == 0 {
            return Err(AppError::not_found(format!("task {} not found", task.id)));
        }
        self.publish();
        Ok(())
    }

    /// Removes the row and hands back what was stored.
    pub fn delete(&self, id: &str) -> Result<Option<Task>, AppError> {
        let removed = {
            let conn = self.conn()?;
            let row = conn
                .query_row(
                    &format!("{SELECT_TASKS} WHERE id = ?1"),
                    params![id],
                    TaskRow::from_row,
                )
                .optional()?;
            if row.is_some() {
                conn.execute(DELETE_TASK, params![id])?;
            }
            row
        };

        let removed = removed.map(TaskRow::into_task).transpose()?;
        if removed.is_some() {
            self.publish();
        }
        Ok(removed)
    }

    /// Subscribes to table snapshots; the current contents arrive first.
    pub fn watch(&self) -> Result<TaskFeed, AppError> {
        let (tx, rx) = mpsc::channel();
        // Writers publish under this lock, so none can slip between snapshot and registration.
        let mut watchers = self
            .watchers
            .lock()
            .map_err(|_| AppError::storage("task store lock poisoned"))?;
        tx.send(self.list_all()?)
            .map_err(|_| AppError::storage("task feed closed"))?;
        watchers.push(tx);
        Ok(TaskFeed { rx })
    }

    fn publish(&self) {
        let Ok(mut watchers) = self.watchers.lock() else {
            return;
        };
        if watchers.is_empty() {
            return;
        }

        match self.list_all() {
            Ok(snapshot) => watchers.retain(|tx| tx.send(snapshot.clone()).is_ok()),
            Err(err) => log::warn!("skipping task feed update: {err}"),
        }
    }
}

fn write_task(conn: &Connection, sql: &str, task: &Task) -> rusqlite::Result<usize> {
    conn.execute(
        sql,
        params![
            task.id,
            task.title,
            task.description,
            task.due_date.map(to_millis),
            task.is_completed,
            to_millis(task.created_at),
            to_millis(task.updated_at),
        ],
    )
}
