use std::time::Duration;

use thiserror::Error;

/// Errors from calls to a remote service.
///
/// Only [`RemoteError::RateLimited`] is transient; every other variant is
/// surfaced to the caller without retrying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The service asked us to slow down (HTTP 429 or 503).
    #[error("Rate limited (HTTP {status})")]
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Authentication failed or the token lacks permission.
    #[error("Authentication failed (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// The service rejected the request payload.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Resource not found.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Any other non-success response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A response body could not be decoded, or a request could not be encoded.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// A server-side analysis task finished unsuccessfully or timed out.
    #[error("Analysis task {task_id} did not succeed: {message}")]
    Analysis { task_id: String, message: String },
}

impl RemoteError {
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status and body to an error class.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = extract_message(body);
        match status {
            429 | 503 => Self::RateLimited {
                status,
                retry_after,
            },
            401 | 403 => Self::Auth { status, message },
            400 => Self::Validation { message },
            404 => Self::NotFound { resource: message },
            _ => Self::Api { status, message },
        }
    }

    /// Check if this error is a rate limit error (retryable).
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The service reported the resource as already existing.
    ///
    /// Creation endpoints answer 400 with an "already exists" message; callers
    /// re-running a migration treat that as success.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Validation { message } | Self::Api { message, .. } => {
                message.to_ascii_lowercase().contains("already exist")
            }
            _ => false,
        }
    }
}

/// Pull the human-readable message out of an error body.
///
/// The destination answers `{"errors":[{"msg":"..."}]}`; anything else is
/// returned as its first line.
fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(errors) = value.get("errors").and_then(|e| e.as_array())
    {
        let msgs: Vec<&str> = errors
            .iter()
            .filter_map(|e| e.get("msg").and_then(|m| m.as_str()))
            .collect();
        if !msgs.is_empty() {
            return msgs.join("; ");
        }
    }
    body.lines().next().unwrap_or_default().trim().to_string()
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps step results and log
/// lines readable when a body carries a stack trace.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;
