//! Error types for the quill domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all quill operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors from a model backend.
///
/// `Unavailable` is the distinguished kind for "the service itself cannot
/// be reached" (network down, connection refused, local inference service
/// not running) as opposed to the service answering with an error.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// Whether retrying with backoff can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::RateLimited { .. } | Self::Timeout(_)
        )
    }
}

/// Errors from tool lookup, validation, or execution.
///
/// Serializable so the tagged kind travels inside a `ToolResult` and is
/// visible to the model as data, never as a crash.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Malformed tool call: {0}")]
    MalformedCall(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Out of range: requested {requested}, only {available} available")]
    OutOfRange { requested: usize, available: usize },

    #[error("No match for the given find text")]
    NoMatch,

    #[error("Ambiguous match: find text occurs {count} times")]
    AmbiguousMatch { count: usize },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Cancelled before completion")]
    Cancelled,

    #[error("Planning mode requires an initial todo_update plan before other tools")]
    PlanRequired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_displays_correctly() {
        let err = Error::Backend(BackendError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn retryable_kinds() {
        assert!(BackendError::Unavailable("connection refused".into()).is_retryable());
        assert!(BackendError::RateLimited { retry_after_secs: 5 }.is_retryable());
        assert!(BackendError::Timeout("120s".into()).is_retryable());
        assert!(!BackendError::AuthFailed("bad key".into()).is_retryable());
        assert!(
            !BackendError::Api {
                status_code: 500,
                message: "boom".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn tool_error_serializes_with_kind_tag() {
        let err = ToolError::AmbiguousMatch { count: 2 };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains(r#""kind":"ambiguous_match""#));
        assert!(json.contains(r#""count":2"#));

        let back: ToolError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = ToolError::OutOfRange {
            requested: 20,
            available: 15,
        };
        assert!(err.to_string().contains("20"));
        assert!(err.to_string().contains("15"));
    }
}
