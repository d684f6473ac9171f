pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod remote;
pub mod scheduler;
pub mod storage;
pub mod sync;
pub mod task_api;

use clock::SystemClock;
use remote::HttpTasksApi;
use storage::LocalStore;

/// Worker wired to the on-disk store, the HTTP server and the wall clock.
pub type DefaultSyncWorker = sync::SyncWorker<LocalStore, HttpTasksApi, SystemClock>;

/// Builds the production sync worker from config and the stored session.
pub fn sync_worker(
    local: LocalStore,
    config: &config::Config,
) -> Result<DefaultSyncWorker, error::AppError> {
    let token = local.preferences().auth_token()?;
    let api = HttpTasksApi::new(config.server_url()?, config.request_timeout())?.with_token(token);
    let coordinator = sync::SyncCoordinator::new(local, api, SystemClock);
    Ok(sync::SyncWorker::new(
        coordinator,
        sync::RetryPolicy::with_max_attempts(config.max_attempts),
    ))
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::AppError;
    use crate::storage::LocalStore;
    use crate::storage::preferences::PreferenceStore;
    use crate::storage::sqlite_store::TaskStore;
    use std::sync::Arc;

    #[test]
    fn app_error_exposes_code() {
        let err = AppError::invalid_input("missing title");
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn sync_worker_requires_server_url() {
        let local = LocalStore::new(
            Arc::new(TaskStore::open_in_memory().unwrap()),
            PreferenceStore::new(std::env::temp_dir().join("tasksync-never-written.json")),
        );

        let err = super::sync_worker(local, &Config::default()).unwrap_err();

        assert_eq!(err.code(), "not_configured");
    }
}
