use clap::{Parser, Subcommand};
use tasksync_core::config::ConfigOverrides;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a new task
    ///
    /// Example: tasksync add "Buy milk" --due 2025-12-24
    Add {
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        /// Due date as RFC3339 or YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
    },
    /// List all tasks
    ///
    /// Example: tasksync list
    List,
    /// Show details of a task
    ///
    /// Example: tasksync show 3f2c...
    Show { id: String },
    /// Change fields of a task
    ///
    /// Example: tasksync edit 3f2c... --title "Buy oat milk"
    /// Example: tasksync edit 3f2c... --clear-due
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long)]
        clear_due: bool,
    },
    /// Mark a task as completed
    Done { id: String },
    /// Mark a task as not completed
    Undo { id: String },
    /// Flip the completion flag of a task
    Toggle { id: String },
    /// Delete a task
    Delete { id: String },
    /// Sign in and store the session token
    ///
    /// Example: tasksync login me@example.com
    Login { email: String },
    /// Forget the stored session token
    Logout,
    /// Show session and sync state
    Status,
    /// Synchronize tasks with the server
    ///
    /// Example: tasksync sync
    /// Example: tasksync sync --watch
    Sync {
        /// Keep syncing on the configured interval; press Enter to sync now
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    ServerUrl,
    SyncIntervalMinutes,
    MaxAttempts,
    RequestTimeoutSecs,
    LogLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let field = canonicalize_flag_name(key_raw)
        .ok_or_else(|| "override key cannot be empty".to_string())?;

    let target = match field.as_str() {
        "server_url" | "server" => ConfigOverrideTarget::ServerUrl,
        "sync_interval_minutes" | "sync_interval" => ConfigOverrideTarget::SyncIntervalMinutes,
        "max_attempts" => ConfigOverrideTarget::MaxAttempts,
        "request_timeout_secs" | "request_timeout" => ConfigOverrideTarget::RequestTimeoutSecs,
        "log_level" => ConfigOverrideTarget::LogLevel,
        other => return Err(format!("unknown config field '{other}'")),
    };

    Ok(ParsedConfigOverride { target, value })
}

/// Folds every `--config-override` into one set of overrides; later ones win.
pub fn collect_overrides(raw: &[String]) -> Result<ConfigOverrides, String> {
    let mut overrides = ConfigOverrides::default();
    for entry in raw {
        let parsed = parse_config_override(entry)?;
        match parsed.target {
            ConfigOverrideTarget::ServerUrl => overrides.server_url = Some(parsed.value),
            ConfigOverrideTarget::SyncIntervalMinutes => {
                overrides.sync_interval_minutes =
                    Some(parse_positive("sync_interval_minutes", &parsed.value)?);
            }
            ConfigOverrideTarget::MaxAttempts => {
                let attempts = parse_positive("max_attempts", &parsed.value)?;
                overrides.max_attempts = Some(
                    u32::try_from(attempts).map_err(|_| "max_attempts is too large".to_string())?,
                );
            }
            ConfigOverrideTarget::RequestTimeoutSecs => {
                overrides.request_timeout_secs =
                    Some(parse_positive("request_timeout_secs", &parsed.value)?);
            }
            ConfigOverrideTarget::LogLevel => {
                if tasksync_core::config::canonical_log_level(&parsed.value).is_none() {
                    return Err(format!("unknown log_level '{}'", parsed.value));
                }
                overrides.log_level = Some(parsed.value);
            }
        }
    }
    Ok(overrides)
}

fn parse_positive(field: &str, value: &str) -> Result<u64, String> {
    match value.parse::<u64>() {
        Ok(number) if number > 0 => Ok(number),
        _ => Err(format!("{field} must be a positive integer")),
    }
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Splits an interactive line into arguments, honoring double quotes.
pub fn split_command_line(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for ch in line.chars() {
        if escape {
            if ch != '"' && ch != '\\' {
                current.push('\\');
            }
            current.push(ch);
            escape = false;
            continue;
        }

        if in_quotes && ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }

        if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.push(ch);
    }

    if in_quotes {
        return Err("unterminated quote in command".to_string());
    }

    if !current.is_empty() {
        args.push(current);
    }

    Ok(args)
}
