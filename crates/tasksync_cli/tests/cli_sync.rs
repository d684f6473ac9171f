use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};
use tiny_http::{Response, Server, StatusCode};

const REMOTE_TASKS: &str = r#"[{"id":"remote-1","title":"from server","description":"",
    "dueDate":null,"completed":true,"createdAt":"2025-12-20T00:00:00Z",
    "updatedAt":"2025-12-20T00:00:00.500Z"}]"#;

struct Recorded {
    method: String,
    url: String,
    authorization: Option<String>,
    body: String,
}

/// Answers `expected` requests by route, then stops.
fn serve(expected: usize, status: u16) -> (String, Receiver<Recorded>, JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let base = format!("http://{}", server.server_addr());
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        for _ in 0..expected {
            let mut req = server.recv().unwrap();
            let mut body = String::new();
            req.as_reader().read_to_string(&mut body).unwrap();
            let url = req.url().to_string();
            let authorization = req
                .headers()
                .iter()
                .find(|header| header.field.equiv("Authorization"))
                .map(|header| header.value.as_str().to_string());

            let reply = if url.starts_with("/tasks") {
                REMOTE_TASKS
            } else if url == "/auth/login" {
                r#""token-abc""#
            } else {
                ""
            };
            tx.send(Recorded {
                method: req.method().to_string(),
                url,
                authorization,
                body,
            })
            .unwrap();
            req.respond(Response::from_string(reply).with_status_code(StatusCode(status)))
                .unwrap();
        }
    });

    (base, rx, handle)
}

struct TestEnv {
    store_path: PathBuf,
    prefs_path: PathBuf,
    config_path: PathBuf,
}

impl TestEnv {
    fn new(name: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir();
        Self {
            store_path: dir.join(format!("tasksync-{nanos}-{name}.db")),
            prefs_path: dir.join(format!("tasksync-{nanos}-{name}-prefs.json")),
            config_path: dir.join(format!("tasksync-{nanos}-{name}-config.json")),
        }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_tasksync"))
            .args(args)
            .env("TASKSYNC_STORE_PATH", &self.store_path)
            .env("TASKSYNC_PREFS_PATH", &self.prefs_path)
            .env("TASKSYNC_CONFIG_PATH", &self.config_path)
            .env_remove("RUST_LOG")
            .output()
            .expect("failed to run tasksync")
    }

    fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let mut full = args.to_vec();
        full.push("--json");
        let output = self.run(&full);
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        for path in [&self.store_path, &self.prefs_path, &self.config_path] {
            std::fs::remove_file(path).ok();
        }
    }
}

#[test]
fn sync_pushes_local_changes_and_merges_remote_tasks() {
    let env = TestEnv::new("sync");
    env.run_json(&["add", "local only"]);
    let (base, rx, handle) = serve(2, 200);
    let server_override = format!("server_url={base}");

    let report = env.run_json(&["sync", "--config-override", &server_override]);
    handle.join().unwrap();

    assert_eq!(report["pushed"], 1);
    assert_eq!(report["fetched"], 1);
    assert_eq!(report["inserted"], 1);

    let push = rx.recv().unwrap();
    assert_eq!(push.method, "POST");
    assert_eq!(push.url, "/sync");
    assert!(push.body.contains("local only"));

    let fetch = rx.recv().unwrap();
    assert_eq!(fetch.method, "GET");
    assert_eq!(fetch.url, "/tasks?since=0");

    let tasks = env.run_json(&["list"]);
    let titles: Vec<_> = tasks
        .as_array()
        .unwrap()
        .iter()
        .map(|task| task["title"].as_str().unwrap().to_string())
        .collect();
    assert!(titles.contains(&"from server".to_string()));
    assert!(titles.contains(&"local only".to_string()));

    let status = env.run_json(&["status"]);
    assert_ne!(status["last_sync_time"], serde_json::Value::Null);
    assert_eq!(status["pending_changes"], 0);
}

#[test]
fn failed_sync_keeps_watermark_and_exits_non_zero() {
    let env = TestEnv::new("sync-fail");
    env.run_json(&["add", "stays pending"]);
    let (base, rx, handle) = serve(1, 503);
    let server_override = format!("server_url={base}");

    let output = env.run(&[
        "sync",
        "--config-override",
        &server_override,
        "--config-override",
        "max_attempts=1",
    ]);
    handle.join().unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERROR: server_error"));
    assert_eq!(rx.recv().unwrap().url, "/sync");
    assert!(rx.try_recv().is_err());

    let status = env.run_json(&["status"]);
    assert_eq!(status["last_sync_time"], serde_json::Value::Null);
    assert_eq!(status["pending_changes"], 1);
}

#[test]
fn sync_without_server_is_not_configured() {
    let env = TestEnv::new("sync-unconfigured");
    let output = env.run(&["sync"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERROR: not_configured"));
}

#[test]
fn login_stores_token_used_by_sync() {
    let env = TestEnv::new("login");
    let (base, rx, handle) = serve(2, 200);
    let server_override = format!("server_url={base}");

    let login = env.run_json(&["login", "me@example.com", "--config-override", &server_override]);
    assert_eq!(login["logged_in"], true);
    env.run_json(&["sync", "--config-override", &server_override]);
    handle.join().unwrap();

    let login_request = rx.recv().unwrap();
    assert_eq!(login_request.url, "/auth/login");
    assert_eq!(login_request.body, r#""me@example.com""#);
    let fetch = rx.recv().unwrap();
    assert_eq!(fetch.authorization.as_deref(), Some("Bearer token-abc"));

    let status = env.run_json(&["status"]);
    assert_eq!(status["logged_in"], true);

    env.run_json(&["logout"]);
    assert_eq!(env.run_json(&["status"])["logged_in"], false);
}

#[test]
fn login_rejects_malformed_email() {
    let env = TestEnv::new("login-invalid");
    let output = env.run(&[
        "login",
        "not-an-email",
        "--config-override",
        "server_url=http://127.0.0.1:9",
    ]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERROR: invalid_input"));
}
