use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Network-level failure while talking to the backend
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Error code used in structured log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Transport(_) => "STREAM503",
            AppError::Upstream { .. } => "STREAM502",
            AppError::Decode(_) => "STREAM422",
            AppError::Io(_) => "STREAM500",
        }
    }

    /// Whether retrying the same request may succeed
    ///
    /// Connection failures, timeouts, rate limits and 5xx responses are
    /// transient. Everything else fails immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Transport(_) => true,
            AppError::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return AppError::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => AppError::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => AppError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(err.to_string())
    }
}

/// Convenience constructors
impl AppError {
    pub fn transport(msg: impl Into<String>) -> Self {
        AppError::Transport(msg.into())
    }

    pub fn upstream(status: u16, msg: impl Into<String>) -> Self {
        AppError::Upstream {
            status,
            message: msg.into(),
        }
    }
}
