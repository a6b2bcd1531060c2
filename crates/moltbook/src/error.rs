//! Error types for the Moltbook API client.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the Moltbook client.
#[derive(Error, Debug)]
pub enum MoltbookError {
    /// No API key in the environment or any credentials file.
    #[error(
        "No Moltbook credentials found. Set MOLTBOOK_API_KEY or place credentials.json in one of: {}",
        searched.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
    )]
    MissingCredentials {
        /// Credential files that were checked.
        searched: Vec<PathBuf>,
    },

    /// Rate limited; retrying now cannot succeed.
    #[error("Rate limited. Try again in {} minute(s).", retry_after_seconds.div_ceil(60))]
    RateLimited {
        /// Seconds until the client can retry.
        retry_after_seconds: u64,
        /// Requests made before giving up.
        attempts: u32,
    },

    /// API returned an error payload.
    #[error("API error (HTTP {status}): {error}{}", hint.as_ref().map(|h| format!(" (hint: {h})")).unwrap_or_default())]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        error: String,
        /// Optional hint from the API.
        hint: Option<String>,
    },

    /// Tracker state file exists but cannot be parsed.
    #[error("Tracker state at {} is corrupt: {source}", path.display())]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Base URL is not the canonical endpoint.
    #[error("Refusing base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// A write operation was called with an unusable argument.
    #[error("Invalid {field}: {reason}")]
    InvalidArgument {
        field: &'static str,
        reason: &'static str,
    },

    /// The comment was posted but watching it could not be saved. The
    /// server's response is kept so the caller can register the watch again.
    #[error("Comment created but watch registration failed: {source}")]
    WatchFailed {
        response: serde_json::Value,
        #[source]
        source: Box<MoltbookError>,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem access failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MoltbookError {
    pub(crate) fn empty(field: &'static str) -> Self {
        MoltbookError::InvalidArgument {
            field,
            reason: "must not be empty",
        }
    }
}

/// Result type for Moltbook operations.
pub type Result<T> = std::result::Result<T, MoltbookError>;
