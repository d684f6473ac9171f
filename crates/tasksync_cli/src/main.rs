mod cli;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use cli::{Cli, Command, collect_overrides, split_command_line};
use tasksync_core::clock::{Clock, SystemClock};
use tasksync_core::config::{self, Config};
use tasksync_core::error::AppError;
use tasksync_core::model::timestamp::format_rfc3339;
use tasksync_core::model::{NewTask, Task, TaskPatch, describe_due};
use tasksync_core::remote::HttpTasksApi;
use tasksync_core::scheduler::{RecurringRunner, SYNC_WORK_NAME, ServerReachable, ThreadScheduler};
use tasksync_core::storage::LocalStore;
use tasksync_core::storage::sqlite_store::TaskStore;
use tasksync_core::sync::{CancelToken, LocalTasks, SyncOutcome, SyncReport};
use tasksync_core::{auth, task_api};

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

struct App {
    config: Config,
    local: LocalStore,
    json: bool,
}

impl App {
    fn store(&self) -> &TaskStore {
        self.local.tasks()
    }
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "TITLE")]
    title: String,
    #[tabled(rename = "DONE")]
    done: &'static str,
    #[tabled(rename = "DUE")]
    due: String,
}

fn due_label(task: &Task) -> String {
    let today = task_api::today(&SystemClock);
    let offset = task_api::local_offset();
    describe_due(task.due_date.map(|due| due.to_offset(offset).date()), today)
}

fn task_json(task: &Task) -> Result<serde_json::Value, AppError> {
    let mut value =
        serde_json::to_value(task).map_err(|err| AppError::serialization(err.to_string()))?;
    value["due_label"] = serde_json::Value::String(due_label(task));
    value["is_due"] = serde_json::Value::Bool(task.is_due(SystemClock.now()));
    Ok(value)
}

fn print_task_json(task: &Task) -> Result<(), AppError> {
    println!("{}", task_json(task)?);
    Ok(())
}

fn print_tasks_json(tasks: &[Task]) -> Result<(), AppError> {
    let payload = tasks.iter().map(task_json).collect::<Result<Vec<_>, _>>()?;
    println!("{}", serde_json::Value::Array(payload));
    Ok(())
}

fn print_tasks_plain(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks");
        return;
    }

    let rows = tasks.iter().map(|task| TaskRow {
        id: task.id.clone(),
        title: task.title.clone(),
        done: if task.is_completed { "x" } else { "" },
        due: due_label(task),
    });
    let mut table = Table::new(rows);
    table.with(Style::psql());
    println!("{table}");
}

fn print_task_details(task: &Task) -> Result<(), AppError> {
    let due = match task.due_date {
        Some(due) => format!("{} ({})", format_rfc3339(due)?, due_label(task)),
        None => due_label(task),
    };
    println!("id:          {}", task.id);
    println!("title:       {}", task.title);
    println!("description: {}", task.description);
    println!("due:         {due}");
    println!(
        "completed:   {}",
        if task.is_completed { "yes" } else { "no" }
    );
    println!("created:     {}", format_rfc3339(task.created_at)?);
    println!("updated:     {}", format_rfc3339(task.updated_at)?);
    Ok(())
}

fn print_report(report: &SyncReport, json: bool) -> Result<(), AppError> {
    if json {
        let value = serde_json::to_value(report)
            .map_err(|err| AppError::serialization(err.to_string()))?;
        println!("{value}");
    } else if report.is_idle() {
        println!("Already up to date");
    } else {
        println!(
            "Synced: pushed {}, fetched {} (inserted {}, overwritten {}, kept local {})",
            report.pushed, report.fetched, report.inserted, report.overwritten, report.kept_local
        );
    }
    Ok(())
}

fn parse_due(value: Option<String>) -> Result<Option<time::OffsetDateTime>, AppError> {
    value.as_deref().map(task_api::parse_due_input).transpose()
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn is_informational(err: &clap::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
    )
}

fn print_help() {
    let mut cmd = Cli::command();
    let help = cmd.render_help();
    println!("{help}");
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

fn run_cli(base: &Config, cli: Cli) -> Result<(), AppError> {
    let overrides = collect_overrides(&cli.config_override).map_err(AppError::invalid_input)?;
    let app = App {
        config: config::merge_overrides(base, &overrides),
        local: LocalStore::open_default()?,
        json: cli.json,
    };
    run_command(&app, cli.command)
}

fn run_command(app: &App, command: Command) -> Result<(), AppError> {
    let clock = SystemClock;
    match command {
        Command::Add {
            title,
            description,
            due,
        } => {
            let title = match title {
                Some(value) if !value.trim().is_empty() => value,
                _ => return Err(AppError::invalid_input("title is required")),
            };
            let new = NewTask {
                title,
                description: description.unwrap_or_default(),
                due_date: parse_due(due)?,
            };

            let task = task_api::add_task(app.store(), &clock, new)?;
            if app.json {
                print_task_json(&task)?;
            } else {
                println!("Added task: {} ({})", task.title, task.id);
            }
        }
        Command::List => {
            let tasks = task_api::list_tasks(app.store())?;
            if app.json {
                print_tasks_json(&tasks)?;
            } else {
                print_tasks_plain(&tasks);
            }
        }
        Command::Show { id } => {
            let task = task_api::get_task(app.store(), &id)?;
            if app.json {
                print_task_json(&task)?;
            } else {
                print_task_details(&task)?;
            }
        }
        Command::Edit {
            id,
            title,
            description,
            due,
            clear_due,
        } => {
            let due_date = if clear_due {
                Some(None)
            } else {
                parse_due(due)?.map(Some)
            };
            let patch = TaskPatch {
                title,
                description,
                due_date,
                is_completed: None,
            };

            let task = task_api::edit_task(app.store(), &clock, &id, patch)?;
            if app.json {
                print_task_json(&task)?;
            } else {
                println!("Updated task: {} ({})", task.title, task.id);
            }
        }
        Command::Done { id } => {
            let task = task_api::set_completed(app.store(), &clock, &id, true)?;
            if app.json {
                print_task_json(&task)?;
            } else {
                println!("Completed task: {} ({})", task.title, task.id);
            }
        }
        Command::Undo { id } => {
            let task = task_api::set_completed(app.store(), &clock, &id, false)?;
            if app.json {
                print_task_json(&task)?;
            } else {
                println!("Reopened task: {} ({})", task.title, task.id);
            }
        }
        Command::Toggle { id } => {
            let task = task_api::toggle_task(app.store(), &clock, &id)?;
            if app.json {
                print_task_json(&task)?;
            } else {
                let state = if task.is_completed { "completed" } else { "open" };
                println!("Task is now {state}: {} ({})", task.title, task.id);
            }
        }
        Command::Delete { id } => {
            let task = task_api::delete_task(app.store(), &id)?;
            if app.json {
                print_task_json(&task)?;
            } else {
                println!("Deleted task: {} ({})", task.title, task.id);
            }
        }
        Command::Login { email } => {
            let api = HttpTasksApi::new(app.config.server_url()?, app.config.request_timeout())?;
            auth::login(&api, app.local.preferences(), &email)?;
            if app.json {
                println!("{}", serde_json::json!({ "logged_in": true, "email": email.trim() }));
            } else {
                println!("Logged in as {}", email.trim());
            }
        }
        Command::Logout => {
            auth::logout(app.local.preferences())?;
            if app.json {
                println!("{}", serde_json::json!({ "logged_in": false }));
            } else {
                println!("Logged out");
            }
        }
        Command::Status => print_status(app)?,
        Command::Sync { watch: false } => {
            let worker = tasksync_core::sync_worker(app.local.clone(), &app.config)?;
            match worker.run(&CancelToken::new()) {
                SyncOutcome::Synced { report, .. } => print_report(&report, app.json)?,
                SyncOutcome::Failed { error, .. } => return Err(error),
            }
        }
        Command::Sync { watch: true } => watch_sync(app)?,
    }

    Ok(())
}

fn print_status(app: &App) -> Result<(), AppError> {
    let preferences = app.local.preferences().load()?;
    let watermark = app.local.watermark()?;
    let pending = app.local.tasks_updated_after(watermark)?.len();
    let total = app.store().list_all()?.len();
    let last_sync = preferences
        .last_sync_time
        .map(format_rfc3339)
        .transpose()?;

    if app.json {
        let value = serde_json::json!({
            "logged_in": preferences.is_logged_in,
            "server_url": app.config.server_url.as_deref(),
            "last_sync_time": last_sync,
            "tasks": total,
            "pending_changes": pending,
            "sync_interval_minutes": app.config.sync_interval().as_secs() / 60,
        });
        println!("{value}");
    } else {
        println!(
            "logged in:       {}",
            if preferences.is_logged_in { "yes" } else { "no" }
        );
        println!(
            "server:          {}",
            app.config.server_url.as_deref().unwrap_or("(not set)")
        );
        println!(
            "last sync:       {}",
            last_sync.as_deref().unwrap_or("never")
        );
        println!("tasks:           {total}");
        println!("pending changes: {pending}");
    }
    Ok(())
}

/// Runs the periodic sync until stdin closes or reads `exit`; any other line syncs now.
fn watch_sync(app: &App) -> Result<(), AppError> {
    let server_url = app.config.server_url()?.to_string();
    let worker = tasksync_core::sync_worker(app.local.clone(), &app.config)?;
    let constraints = ServerReachable::new(&server_url, REACHABILITY_TIMEOUT)?;
    let mut scheduler = ThreadScheduler::new(Arc::new(constraints));

    let feed = task_api::watch_tasks(app.store())?;
    let json = app.json;
    std::thread::spawn(move || {
        while let Some(first) = feed.recv() {
            let snapshot = feed.latest().unwrap_or(first);
            let open = snapshot.iter().filter(|task| !task.is_completed).count();
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "tasks": snapshot.len(), "open": open })
                );
            } else {
                println!("{} task(s), {open} open", snapshot.len());
            }
        }
    });

    scheduler.schedule_periodic(
        SYNC_WORK_NAME,
        app.config.sync_interval(),
        Box::new(move |cancel| {
            if let SyncOutcome::Synced { report, .. } = worker.run(cancel)
                && let Err(err) = print_report(&report, json)
            {
                log::error!("cannot print sync report: {err}");
            }
        }),
    )?;
    if !json {
        println!(
            "Syncing every {} minutes. Press Enter to sync now, type exit to stop.",
            app.config.sync_interval().as_secs() / 60
        );
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }
        scheduler.trigger_now(SYNC_WORK_NAME)?;
    }

    scheduler.shutdown();
    Ok(())
}

fn run_interactive(base: &Config) -> Result<(), AppError> {
    let mut input = String::new();
    let stdin = io::stdin();

    loop {
        input.clear();
        let bytes = stdin.lock().read_line(&mut input)?;

        if bytes == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if line == "help" || line == "?" {
            print_help();
            continue;
        }

        let args = match split_command_line(line) {
            Ok(args) => args,
            Err(err) => {
                eprintln!("ERROR: {}", AppError::invalid_input(err));
                continue;
            }
        };

        if args.is_empty() {
            continue;
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("tasksync".to_string());
        argv.extend(args);

        let cli = match Cli::try_parse_from(argv) {
            Ok(cli) => cli,
            Err(err) if is_informational(&err) => {
                println!("{err}");
                continue;
            }
            Err(err) => {
                eprintln!("ERROR: {}", normalize_parse_error(err));
                continue;
            }
        };

        if let Err(err) = run_cli(base, cli) {
            eprintln!("ERROR: {}", err);
        }
    }

    Ok(())
}

/// Loads the config file and starts logging at its level, honoring a
/// `log_level` override when one was passed.
fn load_base_config(raw_overrides: &[String]) -> Config {
    let load = config::load_config_with_fallback();
    let level = collect_overrides(raw_overrides)
        .map(|overrides| config::merge_overrides(&load.config, &overrides).log_level)
        .unwrap_or_else(|_| load.config.log_level.clone());
    init_logging(&level);
    if let Some(err) = load.error {
        log::warn!("using default configuration: {err}");
    }
    load.config
}

fn main() {
    let mut args = std::env::args_os();
    args.next();
    if args.next().is_none() {
        let base = load_base_config(&[]);
        if let Err(err) = run_interactive(&base) {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
        return;
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if is_informational(&err) => err.exit(),
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    let base = load_base_config(&cli.config_override);
    if let Err(err) = run_cli(&base, cli) {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
