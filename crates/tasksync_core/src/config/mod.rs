use crate::error::AppError;
use crate::scheduler::periodic_interval;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "TASKSYNC_CONFIG_PATH";
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

fn default_sync_interval_minutes() -> u64 {
    15
}

fn default_max_attempts() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Maps level spellings onto the filter names `env_logger` understands.
pub fn canonical_log_level(raw: &str) -> Option<String> {
    let cleaned = raw.trim().to_ascii_lowercase();
    let level = match cleaned.as_str() {
        "warning" => "warn",
        "err" => "error",
        "none" | "quiet" => "off",
        other => other,
    };
    LOG_LEVELS
        .contains(&level)
        .then(|| level.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default = "default_sync_interval_minutes")]
    pub sync_interval_minutes: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: None,
            sync_interval_minutes: default_sync_interval_minutes(),
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// The configured server, or `not_configured` when unset.
    pub fn server_url(&self) -> Result<&str, AppError> {
        self.server_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                AppError::not_configured(
                    "server_url is not set (use --config-override server_url=<url>)",
                )
            })
    }

    pub fn sync_interval(&self) -> Duration {
        periodic_interval(self.sync_interval_minutes)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.sync_interval_minutes == 0 {
            return Err(AppError::invalid_data("sync_interval_minutes must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(AppError::invalid_data("max_attempts must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::invalid_data("request_timeout_secs must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub sync_interval_minutes: Option<u64>,
    pub max_attempts: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

pub fn config_path() -> Result<PathBuf, AppError> {
    crate::storage::path_from_env_or_default(CONFIG_ENV_VAR, CONFIG_FILE_NAME)
}

pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let mut config: Config = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })?;

    config.log_level = canonical_log_level(&config.log_level).ok_or_else(|| {
        AppError::invalid_data(format!(
            "unknown log_level {} in {}",
            config.log_level,
            path.display()
        ))
    })?;
    config.validate()?;
    Ok(config)
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Config {
    let mut merged = base.clone();
    if let Some(server_url) = overrides.server_url.as_ref() {
        merged.server_url = Some(server_url.clone());
    }
    if let Some(minutes) = overrides.sync_interval_minutes {
        merged.sync_interval_minutes = minutes;
    }
    if let Some(max_attempts) = overrides.max_attempts {
        merged.max_attempts = max_attempts;
    }
    if let Some(timeout) = overrides.request_timeout_secs {
        merged.request_timeout_secs = timeout;
    }
    if let Some(level) = overrides.log_level.as_deref()
        && let Some(normalized) = canonical_log_level(level)
    {
        merged.log_level = normalized;
    }

    merged
}
