//! The typed error surfaced by every failing request.
//!
//! Heterogeneous backend error bodies, transport failures, and client-side
//! deadlines are all normalized into one [`ApiError`] carrying an HTTP status,
//! the raw detail payload, and a human-readable message.

use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

use crate::locale::Locale;

/// Client-perceived timeout, also used for aborted attempts
pub const STATUS_TIMEOUT: u16 = 408;
/// Unknown, transport, or parse failures
pub const STATUS_UNKNOWN: u16 = 500;

/// Fields probed for a human-readable message, highest priority first
const MESSAGE_FIELDS: &[&str] = &["detail", "error", "message"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// 4xx other than 408: never retried
    Client,
    /// 5xx and unknown failures
    Server,
    /// 408, including deadlines enforced by the client
    Timeout,
    /// The caller's cancellation signal fired
    Cancelled,
}

#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct ApiError {
    pub status: u16,
    pub detail: Value,
    pub message: String,
    /// Set only by [`ApiError::cancelled`]; a backend body can never raise it
    #[serde(skip)]
    cancelled: bool,
}

impl ApiError {
    pub fn new(status: u16, detail: Value, message: impl Into<String>) -> Self {
        Self {
            status,
            detail,
            message: message.into(),
            cancelled: false,
        }
    }

    /// Normalize a non-2xx response body
    pub fn from_response(status: u16, body: &[u8], locale: Locale) -> Self {
        let detail = serde_json::from_slice::<Value>(body)
            .ok()
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| json!({}));

        let message = extract_message(&detail).unwrap_or_else(|| locale.request_failed(status));

        Self::new(status, detail, message)
    }

    /// An attempt exceeded its deadline
    pub fn timeout(endpoint: &str, timeout: Duration, elapsed: Duration, locale: Locale) -> Self {
        Self::new(
            STATUS_TIMEOUT,
            json!({
                "endpoint": endpoint,
                "timeout_ms": timeout.as_millis() as u64,
                "elapsed_ms": elapsed.as_millis() as u64,
            }),
            locale.request_timeout(endpoint, elapsed),
        )
    }

    /// The caller (or client shutdown) abandoned the request
    pub fn cancelled(endpoint: &str, locale: Locale) -> Self {
        Self {
            cancelled: true,
            ..Self::new(
                STATUS_TIMEOUT,
                json!({ "endpoint": endpoint, "cancelled": true }),
                locale.request_cancelled(endpoint),
            )
        }
    }

    /// Connection-level failure with no HTTP response
    pub fn transport(endpoint: &str, error: impl std::fmt::Display, locale: Locale) -> Self {
        Self::new(
            STATUS_UNKNOWN,
            json!({ "endpoint": endpoint, "error": error.to_string() }),
            locale.request_failed(STATUS_UNKNOWN),
        )
    }

    /// A body that could not be parsed or decoded into the expected shape
    pub fn unexpected(endpoint: &str, error: impl std::fmt::Display, locale: Locale) -> Self {
        Self::new(
            STATUS_UNKNOWN,
            json!({ "endpoint": endpoint, "error": error.to_string() }),
            locale.unexpected_response(endpoint),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_cancelled() {
            ErrorKind::Cancelled
        } else if self.status == STATUS_TIMEOUT {
            ErrorKind::Timeout
        } else if (400..500).contains(&self.status) {
            ErrorKind::Client
        } else {
            ErrorKind::Server
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }
}

/// Find a human-readable message in an error payload
///
/// Rules per field, in [`MESSAGE_FIELDS`] order:
/// - a non-empty string is used as is
/// - a list of validation entries (`[{"msg": ...}]`) is joined with `"; "`
/// - an object carrying a string `message` yields that message
pub fn extract_message(payload: &Value) -> Option<String> {
    MESSAGE_FIELDS
        .iter()
        .filter_map(|field| payload.get(field))
        .find_map(message_from_field)
}

fn message_from_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        _ => None,
    }
}
