//! Encore IPC - Command bus between the daemon and its control surfaces.
//!
//! This crate defines the command catalog and the wire protocol, the
//! authorization gate the daemon runs before every command, and the client
//! and server transports.

pub mod client;
pub mod commands;
pub mod error;
pub mod events;
pub mod gate;
pub mod messages;
pub mod server;

pub use client::{ConnectionStatus, IpcClient, Notice, Subscription};
pub use commands::{Command, CommandDefinition, CommandKind, CommandRegistry, RegistryError};
pub use error::{AuthorizationFailure, IpcError, IpcResult};
pub use events::{Event, EventType, LogData};
pub use gate::AuthorizationGate;
pub use messages::{ErrorInfo, Request, Response};
pub use server::{IncomingRequest, IpcServer};

use std::path::PathBuf;

/// Get the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/encore/daemon.sock` or falls back to
/// `/run/user/$UID/encore/daemon.sock`.
#[must_use]
#[allow(unsafe_code)] // libc::getuid() is safe to call
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("encore/daemon.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{uid}/encore/daemon.sock"))
    }
}
