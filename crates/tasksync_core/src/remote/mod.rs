//! Remote task service: the wire format and its HTTP client.

pub mod dto;
pub mod http;

use crate::error::AppError;
use crate::model::Task;
use time::OffsetDateTime;

pub use http::HttpTasksApi;

/// Server side of a sync cycle.
pub trait RemoteTasks: Send + Sync {
    /// Tasks the server changed strictly after `since`.
    fn fetch_since(&self, since: OffsetDateTime) -> Result<Vec<Task>, AppError>;

    /// Upserts the batch by id. Sending the same batch twice must be harmless.
    fn push(&self, tasks: &[Task]) -> Result<(), AppError>;
}

pub trait AuthApi {
    /// Exchanges an email address for a bearer token.
    fn login(&self, email: &str) -> Result<String, AppError>;
}
