//! IPC message types.

use encore_core::Denial;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::Event;

/// Status codes and message keys used in error responses.
pub mod codes {
    pub const BAD_REQUEST: i32 = 400;
    pub const FORBIDDEN: i32 = 403;
    pub const NOT_FOUND: i32 = 404;
    pub const INTERNAL: i32 = 500;

    pub const INSUFFICIENT_ROLE: &str = "INSUFFICIENT_ROLE";
    pub const SERVER_IN_LIMITED_MODE: &str = "SERVER_IN_LIMITED_MODE";
    pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";
}

/// Request envelope sent from client to daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for matching responses
    pub id: u64,
    /// Wire name of the command
    pub name: String,
    /// Command payload, absent for parameterless commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Session token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
}

/// Response envelope sent from daemon to client.
///
/// Serialized as `{id, ok: true, data}` or `{id, ok: false, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this is responding to
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
}

impl Response {
    #[must_use]
    pub fn success(id: u64, data: Value) -> Self {
        Self { id, ok: true, data: Some(data), error: None }
    }

    #[must_use]
    pub fn failure(id: u64, error: ErrorInfo) -> Self {
        Self { id, ok: false, data: None, error: Some(error) }
    }

    #[must_use]
    pub fn from_result(id: u64, result: Result<Value, ErrorInfo>) -> Self {
        match result {
            Ok(data) => Self::success(id, data),
            Err(error) => Self::failure(id, error),
        }
    }

    /// Unpack the response. A success without data yields `null`.
    ///
    /// # Errors
    /// Returns the server's error information for failed responses.
    pub fn into_result(self) -> Result<Value, ErrorInfo> {
        if self.ok {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(self
                .error
                .unwrap_or_else(|| ErrorInfo::new(codes::INTERNAL, "missing error information")))
        }
    }
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// HTTP-like status code
    pub code: i32,
    /// Message key or human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(codes::BAD_REQUEST, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(codes::NOT_FOUND, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL, message)
    }

    #[must_use]
    pub fn forbidden(denial: Denial) -> Self {
        Self::new(codes::FORBIDDEN, denial.message_key())
    }
}

/// Any message a client can receive.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    Response(Response),
    Event(Event),
}
