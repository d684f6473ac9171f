use super::dto::TaskDto;
use super::{AuthApi, RemoteTasks};
use crate::error::AppError;
use crate::model::Task;
use crate::model::timestamp::to_millis;
use std::time::Duration;
use time::OffsetDateTime;
use url::Url;

const USER_AGENT: &str = concat!("tasksync/", env!("CARGO_PKG_VERSION"));

/// Parses a configured server URL into a base that relative endpoints join onto.
pub fn parse_server_url(raw: &str) -> Result<Url, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::not_configured("server_url is not set"));
    }

    let mut url = Url::parse(trimmed)
        .map_err(|err| AppError::invalid_input(format!("server_url {trimmed}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::invalid_input(format!(
            "server_url must be http or https, got {}",
            url.scheme()
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Clone)]
pub struct HttpTasksApi {
    agent: ureq::Agent,
    base_url: Url,
    token: Option<String>,
}

impl std::fmt::Debug for HttpTasksApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTasksApi")
            .field("base_url", &self.base_url.as_str())
            .field("authorized", &self.token.is_some())
            .finish()
    }
}

impl HttpTasksApi {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let base_url = parse_server_url(server_url)?;
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();

        Ok(Self {
            agent,
            base_url,
            token: None,
        })
    }

    /// Sends `Authorization: Bearer <token>` on every request when set.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|token| !token.trim().is_empty());
        self
    }

    fn request(&self, method: &str, path: &str) -> Result<ureq::Request, AppError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| AppError::invalid_input(format!("endpoint {path}: {err}")))?;
        log::debug!("{method} {url}");

        let request = self.agent.request_url(method, &url);
        Ok(match self.token.as_deref() {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        })
    }
}

impl RemoteTasks for HttpTasksApi {
    fn fetch_since(&self, since: OffsetDateTime) -> Result<Vec<Task>, AppError> {
        let response = self
            .request("GET", "tasks")?
            .query("since", &to_millis(since).to_string())
            .call()
            .map_err(map_request_error)?;

        let payload: Vec<TaskDto> = response
            .into_json()
            .map_err(|err| AppError::serialization(format!("tasks payload: {err}")))?;
        Ok(payload
            .into_iter()
            .filter_map(|dto| {
                let id = dto.id.clone();
                Task::try_from(dto)
                    .inspect_err(|err| log::warn!("skipping remote task {id}: {err}"))
                    .ok()
            })
            .collect())
    }

    fn push(&self, tasks: &[Task]) -> Result<(), AppError> {
        let payload: Vec<TaskDto> = tasks.iter().map(TaskDto::from).collect();
        self.request("POST", "sync")?
            .send_json(&payload)
            .map_err(map_request_error)?;
        Ok(())
    }
}

impl AuthApi for HttpTasksApi {
    fn login(&self, email: &str) -> Result<String, AppError> {
        let response = self
            .request("POST", "auth/login")?
            .send_json(email)
            .map_err(map_request_error)?;

        let token: String = response
            .into_json()
            .map_err(|err| AppError::serialization(format!("login payload: {err}")))?;
        if token.trim().is_empty() {
            return Err(AppError::serialization("login returned an empty token"));
        }
        Ok(token)
    }
}

fn map_request_error(err: ureq::Error) -> AppError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            let detail = body.trim();
            if detail.is_empty() {
                AppError::server(status, format!("server returned {status}"))
            } else {
                AppError::server(status, format!("server returned {status}: {detail}"))
            }
        }
        ureq::Error::Transport(transport) => AppError::transport(transport.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpTasksApi, parse_server_url};
    use crate::error::AppError;
    use crate::model::Task;
    use crate::remote::{AuthApi, RemoteTasks};
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::mpsc::{self, Receiver};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use time::macros::datetime;
    use tiny_http::{Response, Server, StatusCode};

    struct Recorded {
        method: String,
        url: String,
        authorization: Option<String>,
        body: String,
    }

    fn serve(replies: Vec<(u16, &'static str)>) -> (String, Receiver<Recorded>, JoinHandle<()>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let base = format!("http://{}", server.server_addr());
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            for (status, body) in replies {
                let mut req = server.recv().unwrap();
                let mut content = String::new();
                req.as_reader().read_to_string(&mut content).unwrap();
                let authorization = req
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv("Authorization"))
                    .map(|header| header.value.as_str().to_string());
                tx.send(Recorded {
                    method: req.method().to_string(),
                    url: req.url().to_string(),
                    authorization,
                    body: content,
                })
                .unwrap();
                req.respond(Response::from_string(body).with_status_code(StatusCode(status)))
                    .unwrap();
            }
        });

        (base, rx, handle)
    }

    fn api(base: &str) -> HttpTasksApi {
        HttpTasksApi::new(base, Duration::from_secs(5)).unwrap()
    }

    fn sample_task() -> Task {
        Task {
            id: "1".to_string(),
            title: "A".to_string(),
            description: String::new(),
            due_date: None,
            is_completed: false,
            created_at: datetime!(2025-12-20 00:00 UTC),
            updated_at: datetime!(2025-12-20 00:00:00.100 UTC),
        }
    }

    #[test]
    fn fetch_sends_since_millis_and_bearer_token() {
        let (base, rx, handle) = serve(vec![(
            200,
            r#"[{"id":"1","title":"B","description":"","dueDate":null,"completed":false,
                "createdAt":"2025-12-20T00:00:00Z","updatedAt":"2025-12-20T00:00:00.200Z"}]"#,
        )]);

        let tasks = api(&base)
            .with_token(Some("secret".to_string()))
            .fetch_since(datetime!(2025-12-20 10:15:30.123 UTC))
            .unwrap();
        handle.join().unwrap();
        let request = rx.recv().unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.url, "/tasks?since=1766225730123");
        assert_eq!(request.authorization.as_deref(), Some("Bearer secret"));
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "B");
    }

    #[test]
    fn fetch_skips_rows_that_fail_validation() {
        let (base, _rx, handle) = serve(vec![(
            200,
            r#"[{"id":"bad","title":"  ","description":"","dueDate":null,"completed":false,
                "createdAt":"2025-12-20T00:00:00Z","updatedAt":"2025-12-20T00:00:00Z"},
               {"id":"good","title":"kept","description":"","dueDate":null,"completed":true,
                "createdAt":"2025-12-20T00:00:00Z","updatedAt":"2025-12-20T00:00:01Z"}]"#,
        )]);

        let tasks = api(&base)
            .fetch_since(datetime!(1970-01-01 0:00 UTC))
            .unwrap();
        handle.join().unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "good");
        assert!(tasks[0].is_completed);
    }

    #[test]
    fn push_posts_camel_case_batch() {
        let (base, rx, handle) = serve(vec![(200, "")]);

        api(&base).push(&[sample_task()]).unwrap();
        handle.join().unwrap();
        let request = rx.recv().unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.url, "/sync");
        assert_eq!(request.authorization, None);
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body[0]["id"], "1");
        assert_eq!(body[0]["completed"], false);
        assert!(body[0].get("createdAt").is_some());
    }

    #[test]
    fn base_path_is_kept_for_endpoints() {
        let (base, rx, handle) = serve(vec![(200, "[]")]);

        let tasks = api(&format!("{base}/api/v1"))
            .fetch_since(datetime!(1970-01-01 0:00 UTC))
            .unwrap();
        handle.join().unwrap();

        assert!(tasks.is_empty());
        assert_eq!(rx.recv().unwrap().url, "/api/v1/tasks?since=0");
    }

    #[test]
    fn non_success_status_is_server_error() {
        let (base, _rx, handle) = serve(vec![(503, "maintenance")]);

        let err = api(&base).push(&[sample_task()]).unwrap_err();
        handle.join().unwrap();

        match err {
            AppError::Server { status, message } => {
                assert_eq!(status, 503);
                assert!(message.contains("maintenance"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_payload_is_serialization_error() {
        let (base, _rx, handle) = serve(vec![(200, "{not json")]);

        let err = api(&base)
            .fetch_since(datetime!(1970-01-01 0:00 UTC))
            .unwrap_err();
        handle.join().unwrap();

        assert_eq!(err.code(), "serialization_error");
    }

    #[test]
    fn unreachable_server_is_transport_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = api(&format!("http://127.0.0.1:{port}"))
            .push(&[sample_task()])
            .unwrap_err();

        assert_eq!(err.code(), "transport_error");
    }

    #[test]
    fn login_posts_email_string_and_reads_token() {
        let (base, rx, handle) = serve(vec![(200, r#""token-123""#)]);

        let token = api(&base).login("me@example.com").unwrap();
        handle.join().unwrap();
        let request = rx.recv().unwrap();

        assert_eq!(token, "token-123");
        assert_eq!(request.url, "/auth/login");
        assert_eq!(request.body, r#""me@example.com""#);
    }

    #[test]
    fn server_url_validation() {
        assert_eq!(parse_server_url("  ").unwrap_err().code(), "not_configured");
        assert_eq!(
            parse_server_url("ftp://example.com").unwrap_err().code(),
            "invalid_input"
        );
        assert_eq!(
            parse_server_url("https://example.com/api").unwrap().as_str(),
            "https://example.com/api/"
        );
    }
}
