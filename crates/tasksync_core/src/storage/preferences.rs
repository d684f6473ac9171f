use crate::error::AppError;
use crate::model::timestamp::{epoch, from_millis, to_millis};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

pub const SCHEMA_VERSION: u32 = 1;
const PREFS_FILE_NAME: &str = "preferences.json";
const PREFS_ENV_VAR: &str = "TASKSYNC_PREFS_PATH";

#[derive(Debug, Serialize, Deserialize)]
struct StoredPreferences {
    schema_version: u32,
    #[serde(default)]
    last_sync_time: Option<i64>,
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    is_logged_in: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    pub last_sync_time: Option<OffsetDateTime>,
    pub auth_token: Option<String>,
    pub is_logged_in: bool,
}

pub fn preferences_path() -> Result<PathBuf, AppError> {
    super::path_from_env_or_default(PREFS_ENV_VAR, PREFS_FILE_NAME)
}

pub fn load_preferences(path: &Path) -> Result<Preferences, AppError> {
    if !path.exists() {
        return Ok(Preferences::default());
    }

    let content = std::fs::read_to_string(path)?;
    let stored: StoredPreferences =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    if !(1..=SCHEMA_VERSION).contains(&stored.schema_version) {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    if stored.is_logged_in && stored.auth_token.is_none() {
        return Err(AppError::invalid_data("is_logged_in set without auth_token"));
    }

    Ok(Preferences {
        last_sync_time: stored.last_sync_time.map(from_millis).transpose()?,
        auth_token: stored.auth_token,
        is_logged_in: stored.is_logged_in,
    })
}

pub fn save_preferences(path: &Path, preferences: &Preferences) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let stored = StoredPreferences {
        schema_version: SCHEMA_VERSION,
        last_sync_time: preferences.last_sync_time.map(to_millis),
        auth_token: preferences.auth_token.clone(),
        is_logged_in: preferences.is_logged_in,
    };
    let content = serde_json::to_string_pretty(&stored)
        .map_err(|err| AppError::serialization(err.to_string()))?;
    std::fs::write(path, content)?;

    // The file holds the bearer token.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, permissions)?;
    }

    Ok(())
}

/// Read-modify-write access to the preferences file.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Preferences, AppError> {
        load_preferences(&self.path)
    }

    fn update(&self, apply: impl FnOnce(&mut Preferences)) -> Result<(), AppError> {
        let mut preferences = self.load()?;
        apply(&mut preferences);
        save_preferences(&self.path, &preferences)
    }

    /// Last successful sync checkpoint, or the epoch when none was recorded.
    pub fn watermark(&self) -> Result<OffsetDateTime, AppError> {
        Ok(self.load()?.last_sync_time.unwrap_or_else(epoch))
    }

    pub fn set_watermark(&self, value: OffsetDateTime) -> Result<(), AppError> {
        self.update(|preferences| preferences.last_sync_time = Some(value))
    }

    pub fn auth_token(&self) -> Result<Option<String>, AppError> {
        Ok(self.load()?.auth_token)
    }

    pub fn is_logged_in(&self) -> Result<bool, AppError> {
        Ok(self.load()?.is_logged_in)
    }

    pub fn start_session(&self, token: &str) -> Result<(), AppError> {
        let token = token.to_string();
        self.update(|preferences| {
            preferences.auth_token = Some(token);
            preferences.is_logged_in = true;
        })
    }

    /// Forgets the token. The sync watermark is kept.
    pub fn clear_session(&self) -> Result<(), AppError> {
        self.update(|preferences| {
            preferences.auth_token = None;
            preferences.is_logged_in = false;
        })
    }
}
