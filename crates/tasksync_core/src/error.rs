use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("invalid_input - {0}")]
    InvalidInput(String),
    #[error("invalid_data - {0}")]
    InvalidData(String),
    #[error("not_found - {0}")]
    NotFound(String),
    #[error("io_error - {0}")]
    Io(String),
    #[error("storage_error - {0}")]
    Storage(String),
    #[error("transport_error - {0}")]
    Transport(String),
    #[error("server_error - {message}")]
    Server { status: u16, message: String },
    #[error("serialization_error - {0}")]
    Serialization(String),
    #[error("not_configured - {0}")]
    NotConfigured(String),
    #[error("cancelled - {0}")]
    Cancelled(String),
}

impl AppError {
    pub fn invalid_input<M: Into<String>>(message: M) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_data<M: Into<String>>(message: M) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn not_found<M: Into<String>>(message: M) -> Self {
        Self::NotFound(message.into())
    }

    pub fn io<M: Into<String>>(message: M) -> Self {
        Self::Io(message.into())
    }

    pub fn storage<M: Into<String>>(message: M) -> Self {
        Self::Storage(message.into())
    }

    pub fn transport<M: Into<String>>(message: M) -> Self {
        Self::Transport(message.into())
    }

    pub fn server<M: Into<String>>(status: u16, message: M) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn serialization<M: Into<String>>(message: M) -> Self {
        Self::Serialization(message.into())
    }

    pub fn not_configured<M: Into<String>>(message: M) -> Self {
        Self::NotConfigured(message.into())
    }

    pub fn cancelled<M: Into<String>>(message: M) -> Self {
        Self::Cancelled(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidData(_) => "invalid_data",
            Self::NotFound(_) => "not_found",
            Self::Io(_) => "io_error",
            Self::Storage(_) => "storage_error",
            Self::Transport(_) => "transport_error",
            Self::Server { .. } => "server_error",
            Self::Serialization(_) => "serialization_error",
            Self::NotConfigured(_) => "not_configured",
            Self::Cancelled(_) => "cancelled",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidInput(message)
            | Self::InvalidData(message)
            | Self::NotFound(message)
            | Self::Io(message)
            | Self::Storage(message)
            | Self::Transport(message)
            | Self::Serialization(message)
            | Self::NotConfigured(message)
            | Self::Cancelled(message) => message,
            Self::Server { message, .. } => message,
        }
    }

    /// Whether a failed sync attempt with this error is worth repeating.
    ///
    /// Missing configuration and cancellation will not go away by trying again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotConfigured(_) | Self::Cancelled(_))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
