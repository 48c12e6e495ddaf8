use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacklogError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("missing credentials: set {0} (flag, environment or jira.env)")]
    MissingCredentials(String),

    #[error("invalid issue key '{0}': expected PROJECT-123")]
    InvalidKey(String),

    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{method} {url} returned {status}: {body}")]
    Http {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("no transition available for {key} (wanted {target})")]
    NoTransition { key: String, target: String },

    #[error("could not link {child} to {target}: every method was rejected")]
    LinkFailed { child: String, target: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("unknown {kind} '{value}'")]
    Unknown { kind: &'static str, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Env(#[from] dotenvy::Error),
}

impl BacklogError {
    /// True for a non-2xx response with the given status code.
    pub fn is_status(&self, code: u16) -> bool {
        matches!(self, BacklogError::Http { status, .. } if *status == code)
    }
}

pub type Result<T> = std::result::Result<T, BacklogError>;
