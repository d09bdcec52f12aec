use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of response body characters kept inside an error.
pub const BODY_SNIPPET_LIMIT: usize = 500;

/// Errors that can occur in linkpull-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("checkpoint store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("duplicate endpoint name: {0}")]
    DuplicateEndpoint(String),

    #[error("invalid endpoint '{name}': {reason}")]
    InvalidEndpoint { name: String, reason: String },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A terminal failure for one page request, after any transport-level retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, timeout or truncated body that did not recover within the retry budget.
    #[error("transient network error after {attempts} attempt(s): {message}")]
    Transient { message: String, attempts: u32 },

    #[error("client error ({status}) from {endpoint}: {body}")]
    Client {
        status: u16,
        endpoint: String,
        body: String,
    },

    #[error("server error ({status}) from {endpoint}: {body}")]
    Server {
        status: u16,
        endpoint: String,
        body: String,
    },

    #[error("malformed response from {endpoint}: {message} (body: {body})")]
    Malformed {
        endpoint: String,
        message: String,
        body: String,
    },
}

impl FetchError {
    /// Build a client or server error from a non-success status, truncating the body.
    pub fn from_status(status: u16, endpoint: impl Into<String>, body: &str) -> Self {
        let endpoint = endpoint.into();
        let body = truncate_body(body);
        if status >= 500 {
            FetchError::Server {
                status,
                endpoint,
                body,
            }
        } else {
            FetchError::Client {
                status,
                endpoint,
                body,
            }
        }
    }

    pub fn malformed(endpoint: impl Into<String>, message: impl Into<String>, body: &str) -> Self {
        FetchError::Malformed {
            endpoint: endpoint.into(),
            message: message.into(),
            body: truncate_body(body),
        }
    }

    /// Classify this failure into the error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transient { .. } => ErrorKind::TransientNetwork,
            FetchError::Client { status: 403, .. } => ErrorKind::PermissionDenied,
            FetchError::Client { status: 404, .. } => ErrorKind::NotFound,
            FetchError::Client { .. } => ErrorKind::ClientError,
            FetchError::Server { .. } => ErrorKind::ServerError,
            FetchError::Malformed { .. } => ErrorKind::MalformedResponse,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Client { status, .. } | FetchError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Classification of fetch outcomes that are not a clean success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection error, timeout or chunked-encoding truncation.
    TransientNetwork,
    /// HTTP 403.
    PermissionDenied,
    /// HTTP 404.
    NotFound,
    /// Any other 4xx.
    ClientError,
    /// Any 5xx.
    ServerError,
    /// The body was not valid JSON.
    MalformedResponse,
    /// The cursor could not be derived from the trailing item.
    StalledPagination,
    /// The iteration budget ran out before the collection was exhausted.
    BudgetExhausted,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::TransientNetwork,
        ErrorKind::PermissionDenied,
        ErrorKind::NotFound,
        ErrorKind::ClientError,
        ErrorKind::ServerError,
        ErrorKind::MalformedResponse,
        ErrorKind::StalledPagination,
        ErrorKind::BudgetExhausted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ClientError => "client_error",
            ErrorKind::ServerError => "server_error",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::StalledPagination => "stalled_pagination",
            ErrorKind::BudgetExhausted => "budget_exhausted",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::TransientNetwork => "Network failure that outlasted the retry budget",
            ErrorKind::PermissionDenied => "Access denied (403)",
            ErrorKind::NotFound => "Resource not found (404)",
            ErrorKind::ClientError => "Rejected request (4xx)",
            ErrorKind::ServerError => "Server error (5xx)",
            ErrorKind::MalformedResponse => "Response body was not valid JSON",
            ErrorKind::StalledPagination => "Cursor could not advance",
            ErrorKind::BudgetExhausted => "Request budget reached before the end of data",
        }
    }

    /// Whether the whole resource is worth re-queueing by an outer retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientNetwork | ErrorKind::ServerError)
    }

    /// Whether a documented sibling endpoint may be tried once.
    pub fn allows_fallback(&self) -> bool {
        matches!(self, ErrorKind::NotFound)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ErrorKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown error kind: {s}"))
    }
}

/// Cut a response body down to a diagnostic snippet.
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= BODY_SNIPPET_LIMIT {
        return body.to_string();
    }
    let mut snippet: String = body.chars().take(BODY_SNIPPET_LIMIT).collect();
    snippet.push_str("...[truncated]");
    snippet
}
