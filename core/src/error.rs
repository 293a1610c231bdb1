//! Error types for the catalog API client.
//!
//! # Design
//! `NotFound` gets a dedicated variant because views distinguish "the book
//! does not exist" from other failures. Every other non-2xx response, and a
//! 2xx envelope with `success: false`, lands in `Server`. Both carry the
//! server-supplied `message` when the body has one. `Transport` means no
//! response was received at all.
//!
//! Errors are `Clone` so a cache entry can keep the last failure next to the
//! last good data.

use serde::Deserialize;
use thiserror::Error;

/// Shown when a failure carries no server message.
pub const GENERIC_ERROR_MESSAGE: &str = "Unknown error";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The server returned 404.
    #[error("resource not found{}", suffix(.message))]
    NotFound { message: Option<String> },

    /// Non-2xx status other than 404, or an unsuccessful envelope.
    #[error("HTTP {status}{}", suffix(.message))]
    Server { status: u16, message: Option<String> },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

fn suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl ApiError {
    /// Build the error for a non-success response, pulling `message` out of
    /// a JSON error body when there is one.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = server_message(body);
        if status == 404 {
            ApiError::NotFound { message }
        } else {
            ApiError::Server { status, message }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-supplied message, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::NotFound { message } | ApiError::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Text suitable for a notification: the server's message, else the
    /// transport's own description, else [`GENERIC_ERROR_MESSAGE`].
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(detail) if !detail.is_empty() => detail.clone(),
            _ => self
                .server_message()
                .filter(|m| !m.is_empty())
                .unwrap_or(GENERIC_ERROR_MESSAGE)
                .to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn server_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_extracts_message() {
        let err = ApiError::from_status(400, r#"{"success":false,"message":"Not enough copies"}"#);
        assert_eq!(
            err,
            ApiError::Server {
                status: 400,
                message: Some("Not enough copies".to_string())
            }
        );
        assert_eq!(err.user_message(), "Not enough copies");
    }

    #[test]
    fn from_status_404_is_not_found() {
        let err = ApiError::from_status(404, r#"{"message":"Book not found"}"#);
        assert!(matches!(err, ApiError::NotFound { .. }));
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn missing_message_degrades_to_generic() {
        let err = ApiError::from_status(500, "<html>boom</html>");
        assert_eq!(err.server_message(), None);
        assert_eq!(err.user_message(), GENERIC_ERROR_MESSAGE);
        assert_eq!(err.to_string(), "HTTP 500");
    }

    #[test]
    fn display_includes_message() {
        let err = ApiError::NotFound {
            message: Some("Book not found".to_string()),
        };
        assert_eq!(err.to_string(), "resource not found: Book not found");
    }
}
