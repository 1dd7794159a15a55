//! IPC error types.

use std::fmt;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use crate::messages::{ErrorInfo, codes};

/// IPC error type.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Framing error: {0}")]
    Codec(#[from] LinesCodecError),

    /// The connection was lost or closed before a response arrived.
    #[error("Channel closed")]
    ChannelClosed,

    /// The client stopped reading its responses and was disconnected.
    #[error("Client not reading responses")]
    ClientLagging,

    #[error("Not authorized: {0}")]
    Authorization(AuthorizationFailure),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Server error {code}: {message}")]
    Server { code: i32, message: String },

    #[error("Invalid message format")]
    InvalidMessage,
}

/// Which authorization axis refused a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationFailure {
    InsufficientRole,
    RestrictedMode,
}

impl fmt::Display for AuthorizationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InsufficientRole => "insufficient role",
            Self::RestrictedMode => "server in limited mode",
        })
    }
}

impl IpcError {
    /// Whether the error reflects a systemic condition that every surface
    /// should report, rather than a problem with one invocation.
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Authorization(_) | Self::ChannelClosed)
    }
}

impl From<ErrorInfo> for IpcError {
    fn from(info: ErrorInfo) -> Self {
        match (info.code, info.message.as_str()) {
            (codes::FORBIDDEN, codes::INSUFFICIENT_ROLE) => {
                Self::Authorization(AuthorizationFailure::InsufficientRole)
            }
            (codes::FORBIDDEN, codes::SERVER_IN_LIMITED_MODE) => {
                Self::Authorization(AuthorizationFailure::RestrictedMode)
            }
            (codes::BAD_REQUEST, _) => Self::Validation(info.message),
            _ => Self::Server { code: info.code, message: info.message },
        }
    }
}

/// Result type for IPC operations.
pub type IpcResult<T> = Result<T, IpcError>;
