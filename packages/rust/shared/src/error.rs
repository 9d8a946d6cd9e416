//! Error types for pagesmith.
//!
//! Library crates use [`PagesmithError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Classification of an error reported by the remote content API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The requested object does not exist (or is not shared with the integration).
    NotFound,
    /// The token is missing, invalid, or lacks access.
    Unauthorized,
    /// The request body or parameters were rejected.
    InvalidRequest,
    /// The API asked us to slow down.
    RateLimited,
    /// Concurrent edit conflict.
    Conflict,
    /// 5xx from the remote side.
    Server,
    /// Anything else.
    Other,
}

impl ApiErrorKind {
    /// Map the `code` field of a remote error body, falling back to the HTTP status.
    pub fn classify(code: Option<&str>, status: u16) -> Self {
        match code {
            Some("object_not_found") => Self::NotFound,
            Some("unauthorized") | Some("restricted_resource") => Self::Unauthorized,
            Some("validation_error") | Some("invalid_request") | Some("invalid_request_url")
            | Some("invalid_json") => Self::InvalidRequest,
            Some("rate_limited") => Self::RateLimited,
            Some("conflict_error") => Self::Conflict,
            _ => match status {
                400 | 422 => Self::InvalidRequest,
                401 | 403 => Self::Unauthorized,
                404 => Self::NotFound,
                409 => Self::Conflict,
                429 => Self::RateLimited,
                500..=599 => Self::Server,
                _ => Self::Other,
            },
        }
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::Unauthorized => "unauthorized",
            Self::InvalidRequest => "invalid request",
            Self::RateLimited => "rate limited",
            Self::Conflict => "conflict",
            Self::Server => "server error",
            Self::Other => "api error",
        };
        f.write_str(s)
    }
}

/// Top-level error type for all pagesmith operations.
#[derive(Debug, thiserror::Error)]
pub enum PagesmithError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to the remote API.
    #[error("network error: {0}")]
    Network(String),

    /// The remote API answered with an error status.
    #[error("api error ({kind}, HTTP {status}): {message}")]
    Api {
        kind: ApiErrorKind,
        status: u16,
        message: String,
    },

    /// Malformed payload (remote response, block data, persisted JSON).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Content store or build cache error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing title, unknown status, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Page, index, or feed rendering failed.
    #[error("render error: {0}")]
    Render(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PagesmithError>;

impl PagesmithError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a storage error from any displayable message.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build an API error from an HTTP status and the optional error `code`.
    pub fn api(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        Self::Api {
            kind: ApiErrorKind::classify(code, status),
            status,
            message: message.into(),
        }
    }

    /// Permanent errors are never retried: retrying cannot change the outcome.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Api {
                kind: ApiErrorKind::NotFound
                    | ApiErrorKind::Unauthorized
                    | ApiErrorKind::InvalidRequest,
                ..
            }
        )
    }
}
