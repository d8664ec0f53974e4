//! Wayfare error types

use std::time::Duration;

/// Wayfare error types.
///
/// `Clone` because one fetch outcome is handed to every caller coalesced
/// onto the same in-flight request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WayfareError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited by provider, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    /// Provider answered but reported a non-success status in the body
    /// (e.g. `UNKNOWN_ERROR`).
    #[error("provider error {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Provider {
        status: String,
        message: Option<String>,
    },

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("empty response from provider")]
    EmptyResponse,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Optimizer errors
    /// A cached or in-flight value under `key` holds a different type than
    /// the caller asked for. Two call sites share a key but not a result type.
    #[error("cached value for '{key}' has an unexpected type")]
    TypeMismatch { key: String },

    /// The task driving a fetch panicked or was aborted.
    #[error("fetch task failed: {0}")]
    TaskFailed(String),
}

impl WayfareError {
    /// Whether a caller may reasonably retry the same request later.
    ///
    /// The optimizer never retries on its own; this is for callers that
    /// offer a retry affordance.
    pub fn is_transient(&self) -> bool {
        match self {
            WayfareError::RateLimited { .. } | WayfareError::Http(_) => true,
            WayfareError::Api { status, .. } => *status >= 500 || *status == 408,
            WayfareError::Provider { status, .. } => status == "UNKNOWN_ERROR",
            _ => false,
        }
    }

    /// Provider-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            WayfareError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for WayfareError {
    fn from(err: serde_json::Error) -> Self {
        WayfareError::Json(err.to_string())
    }
}

/// Result type alias for Wayfare operations
pub type Result<T> = std::result::Result<T, WayfareError>;
